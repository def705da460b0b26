//! The archive façade.
//!
//! ```no_run
//! use lumpkit_archive::{Archive, ArchiveEntry, ArchiveFormat};
//!
//! let mut archive = Archive::new(ArchiveFormat::Gob)?;
//! archive.add_entry(ArchiveEntry::with_data("readme.txt", b"hello".to_vec()), None, None)?;
//! archive.save("out.gob")?;
//! # Ok::<(), lumpkit_archive::error::Error>(())
//! ```

use std::{
    fmt::{self, Debug},
    path::{Path, PathBuf},
    rc::Rc,
};

use tracing::{debug, info, instrument, warn};

use crate::{
    detect::TypeDetector,
    dir::{ArchiveDir, MergeOutcome},
    entry::{ArchiveEntry, EntryState},
    error::{Error, NotFoundError, Result},
    format::{ArchiveFormat, FormatDescriptor, FormatRegistry},
    handlers::{detect_format, detect_format_file, handler_for, FormatHandler, OpenContext},
    signal::{ArchiveEvent, SignalBlocker, Signals},
};

type Progress = Box<dyn FnMut(usize, usize)>;

/// An archive of one format, owning its directory tree
pub struct Archive {
    format: ArchiveFormat,
    descriptor: FormatDescriptor,
    filename: Option<PathBuf>,
    root: ArchiveDir,
    modified: bool,
    signals: Rc<Signals>,
    handler: Box<dyn FormatHandler>,
    detector: Option<Rc<dyn TypeDetector>>,
    progress: Option<Progress>,
}

impl Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Archive")
            .field("format", &self.format)
            .field("filename", &self.filename)
            .field("entries", &self.root.num_entries(true))
            .field("modified", &self.modified)
            .finish()
    }
}

impl Archive {
    /// Empty archive of `format`, described by the global registry
    pub fn new(format: ArchiveFormat) -> Result<Self> {
        Self::with_registry(format, FormatRegistry::global())
    }

    /// Empty archive of `format`, described by `registry`
    pub fn with_registry(format: ArchiveFormat, registry: &FormatRegistry) -> Result<Self> {
        let handler = handler_for(format).ok_or(Error::UnknownFormat)?;
        let descriptor = registry.get(format).cloned().unwrap_or_else(|| {
            warn!("no descriptor configured for {format}, using defaults");
            FormatDescriptor::builder()
                .format(format)
                .name(format.to_string())
                .build()
        });

        Ok(Archive {
            format,
            root: ArchiveDir::new_root(descriptor.allow_duplicate_names),
            descriptor,
            filename: None,
            modified: false,
            signals: Rc::new(Signals::default()),
            handler,
            detector: None,
            progress: None,
        })
    }

    /// Detect the format of `data` and open it
    pub fn from_data(data: &[u8]) -> Result<Self> {
        let format = detect_format(data);
        if format == ArchiveFormat::Unknown {
            warn!("{}: unable to determine archive format", crate::error::INVALID_ARCHIVE);
            return Err(Error::UnknownFormat);
        }

        let mut archive = Self::new(format)?;
        archive.open_data(data)?;
        Ok(archive)
    }

    /// Detect the format of the file or folder at `path` and open it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = detect_format_file(path);
        if format == ArchiveFormat::Unknown {
            warn!("{}: unable to determine archive format", path.display());
            return Err(Error::UnknownFormat);
        }

        let mut archive = Self::new(format)?;
        archive.open_file(path)?;
        Ok(archive)
    }

    /// Format of the archive
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Capabilities of the archive's format
    pub fn descriptor(&self) -> &FormatDescriptor {
        &self.descriptor
    }

    /// File the archive was last opened from or saved to
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Root of the directory tree
    pub fn root_dir(&self) -> &ArchiveDir {
        &self.root
    }

    /// Entry at `index` of the root directory
    pub fn entry_at(&self, index: usize) -> Option<ArchiveEntry> {
        self.root.entry_at(index)
    }

    /// Entry at the `/` separated `path`
    pub fn entry_at_path(&self, path: &str) -> Option<ArchiveEntry> {
        match path.trim_start_matches('/').rsplit_once('/') {
            Some((dir, name)) => self.root.dir_at_path(dir)?.entry(name),
            None => self.root.entry(path.trim_start_matches('/')),
        }
    }

    /// Number of entries in the root, or in the whole tree
    pub fn num_entries(&self, include_subdirs: bool) -> usize {
        self.root.num_entries(include_subdirs)
    }

    /// Every entry of the tree, subdirectory contents first
    pub fn all_entries(&self) -> Vec<ArchiveEntry> {
        self.root.entry_tree_as_list(false)
    }

    /// Directory at the `/` separated `path`, `""` is the root
    pub fn dir_at_path(&self, path: &str) -> Option<ArchiveDir> {
        self.root.dir_at_path(path)
    }

    /// Whether the archive changed since it was opened or saved
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Set the archive level modified flag, notifying listeners when it flips
    pub fn set_modified(&mut self, modified: bool) {
        if self.modified != modified {
            self.modified = modified;
            self.signals.emit(ArchiveEvent::ModifiedChanged(modified));
        }
    }

    /// Register a change listener
    pub fn subscribe(&self, listener: impl FnMut(&ArchiveEvent) + 'static) {
        self.signals.subscribe(listener);
    }

    /// Suppress change events until the guard is dropped
    pub fn block_signals(&self) -> SignalBlocker {
        self.signals.block()
    }

    /// Attach the detector run after every successful open
    pub fn set_type_detector(&mut self, detector: Rc<dyn TypeDetector>) {
        self.detector = Some(detector);
    }

    /// Attach a callback receiving `(done, total)` while records are parsed
    pub fn set_progress(&mut self, progress: impl FnMut(usize, usize) + 'static) {
        self.progress = Some(Box::new(progress));
    }

    /// Run the attached detector over every entry, returning how many got a type
    pub fn detect_entry_types(&self) -> usize {
        self.detector
            .as_ref()
            .map(|detector| detector.detect_all(&self.all_entries()))
            .unwrap_or(0)
    }

    /// Replace the contents with the archive held in `data`
    ///
    /// On failure the current tree is left as it was.
    #[instrument(skip_all, err, fields(format = %self.format, size = data.len()))]
    pub fn open_data(&mut self, data: &[u8]) -> Result<()> {
        self.load(|handler, ctx| handler.open(data, ctx))
    }

    /// Replace the contents with the archive stored at `path`
    #[instrument(skip(self, path), err, fields(format = %self.format))]
    pub fn open_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.load(|handler, ctx| handler.open_path(path, ctx))?;
        self.filename = Some(path.to_path_buf());
        info!("opened {}", path.display());
        Ok(())
    }

    fn load(
        &mut self,
        open: impl FnOnce(&mut dyn FormatHandler, &mut OpenContext<'_>) -> Result<ArchiveDir>,
    ) -> Result<()> {
        let _blocker = self.signals.block();

        let progress = self
            .progress
            .as_mut()
            .map(|p| p.as_mut() as &mut dyn FnMut(usize, usize));
        let mut ctx = OpenContext::new(&self.descriptor, progress);
        let root = open(self.handler.as_mut(), &mut ctx)?;

        if let Some(detector) = &self.detector {
            let detected = detector.detect_all(&root.entry_tree_as_list(false));
            debug!(detected, "detected entry types");
        }
        root.set_tree_state(EntryState::Unmodified);

        self.root = root;
        self.modified = false;
        self.signals.emit(ArchiveEvent::Refreshed);
        Ok(())
    }

    /// Serialize the archive into `out`
    ///
    /// `out` is only replaced on success. Every entry is then tagged unmodified.
    #[instrument(skip_all, err, fields(format = %self.format))]
    pub fn write(&mut self, out: &mut Vec<u8>) -> Result<()> {
        *out = self.handler.write(&self.root)?;
        self.mark_saved();
        Ok(())
    }

    /// Write the archive to `path`
    #[instrument(skip(self, path), err, fields(format = %self.format))]
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.handler.write_path(&self.root, path)?;
        self.filename = Some(path.to_path_buf());
        self.mark_saved();
        info!("saved {}", path.display());
        Ok(())
    }

    /// Whether this archive's format can be saved
    pub fn can_write(&self) -> bool {
        self.handler.can_write()
    }

    fn mark_saved(&mut self) {
        self.root.set_tree_state(EntryState::Unmodified);
        self.set_modified(false);
    }

    fn owns_dir(&self, dir: &ArchiveDir) -> bool {
        let mut current = dir.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current.ptr_eq(&self.root)
    }

    fn owning_dir(&self, entry: &ArchiveEntry) -> Result<ArchiveDir> {
        entry
            .parent()
            .filter(|dir| self.owns_dir(dir))
            .ok_or(Error::NotFound(NotFoundError::Detached))
    }

    fn target_dir(&self, dir: Option<&ArchiveDir>) -> Result<ArchiveDir> {
        match dir {
            Some(dir) if self.owns_dir(dir) => Ok(dir.clone()),
            Some(_) => Err(Error::NotFound(NotFoundError::Detached)),
            None => Ok(self.root.clone()),
        }
    }

    /// Add a detached `entry` to `dir` (the root when `None`) at `index`
    ///
    /// The name is normalised for the format first. The entry is tagged new.
    pub fn add_entry(
        &mut self,
        entry: ArchiveEntry,
        index: Option<usize>,
        dir: Option<&ArchiveDir>,
    ) -> Result<ArchiveEntry> {
        let dir = self.target_dir(dir)?;
        if entry.parent().is_some() {
            return Err(Error::CustomError(format!(
                "{} already belongs to a directory",
                entry.name()
            )));
        }

        let name = self.descriptor.normalise_name(&entry.name());
        if name.is_empty() {
            return Err(Error::InvalidName(name));
        }
        if !dir.allow_duplicate_names() && dir.name_taken(&name, None) {
            return Err(Error::DuplicateName(name));
        }

        entry.set_name_unchecked(&name);
        self.handler.prepare_entry(&entry);
        let entry = dir.add_entry(entry, index, true)?;
        entry.set_state(EntryState::New);

        self.signals.emit(ArchiveEvent::EntryAdded(entry.clone()));
        self.set_modified(true);
        Ok(entry)
    }

    /// Create and add an empty entry named `name`
    pub fn add_new_entry(
        &mut self,
        name: &str,
        index: Option<usize>,
        dir: Option<&ArchiveDir>,
    ) -> Result<ArchiveEntry> {
        self.add_entry(ArchiveEntry::new(name), index, dir)
    }

    /// Detach `entry` from the archive
    ///
    /// Handles still held elsewhere stay valid and report [`EntryState::Deleted`].
    pub fn remove_entry(&mut self, entry: &ArchiveEntry) -> Result<()> {
        let dir = self.owning_dir(entry)?;
        let index = dir
            .entry_index(entry, 0)
            .ok_or(Error::NotFound(NotFoundError::Detached))?;
        dir.remove_entry(index)?;

        self.signals.emit(ArchiveEvent::EntryRemoved(entry.clone()));
        self.set_modified(true);
        Ok(())
    }

    /// Rename `entry`, applying the format's naming rules and side effects
    pub fn rename_entry(&mut self, entry: &ArchiveEntry, name: &str) -> Result<()> {
        self.owning_dir(entry)?;
        let name = self.descriptor.normalise_name(name);
        let old_name = entry.name();
        self.handler.rename_entry(entry, &name)?;

        self.signals.emit(ArchiveEvent::EntryRenamed {
            entry: entry.clone(),
            old_name,
        });
        self.set_modified(true);
        Ok(())
    }

    /// Move `entry` to `index` within its directory
    pub fn move_entry(&mut self, entry: &ArchiveEntry, index: usize) -> Result<()> {
        let dir = self.owning_dir(entry)?;
        let from = dir
            .entry_index(entry, 0)
            .ok_or(Error::NotFound(NotFoundError::Detached))?;
        dir.move_entry(from, index)?;

        self.signals.emit(ArchiveEvent::EntryModified(entry.clone()));
        self.set_modified(true);
        Ok(())
    }

    /// Replace the data of `entry`
    pub fn import_entry_data(&mut self, entry: &ArchiveEntry, data: &[u8]) -> Result<()> {
        self.owning_dir(entry)?;
        entry.import_buffer(data);

        self.signals.emit(ArchiveEvent::EntryModified(entry.clone()));
        self.set_modified(true);
        Ok(())
    }

    fn require_dirs(&self) -> Result<()> {
        if self.descriptor.supports_dirs {
            Ok(())
        } else {
            Err(Error::UnsupportedOperation {
                format: self.format,
                operation: "directories",
            })
        }
    }

    /// Create the directory at `path` along with any missing parents
    pub fn create_dir(&mut self, path: &str) -> Result<ArchiveDir> {
        self.require_dirs()?;
        let (dir, created) = self.root.get_or_create_subdir(path);
        for subdir in &created {
            if let Some(entry) = subdir.dir_entry() {
                entry.set_state(EntryState::New);
            }
            self.signals.emit(ArchiveEvent::DirAdded(subdir.clone()));
        }
        if !created.is_empty() {
            self.set_modified(true);
        }
        Ok(dir)
    }

    /// Detach the directory at `path` and everything below it
    pub fn remove_dir(&mut self, path: &str) -> Result<ArchiveDir> {
        let dir = self
            .root
            .dir_at_path(path)
            .ok_or_else(|| Error::NotFound(NotFoundError::Path(path.to_owned())))?;
        let parent = dir
            .parent()
            .ok_or_else(|| Error::CustomError("the root directory cannot be removed".into()))?;
        let removed = parent
            .detach_subdir(&dir)
            .ok_or_else(|| Error::NotFound(NotFoundError::Path(path.to_owned())))?;

        self.signals.emit(ArchiveEvent::DirRemoved(removed.clone()));
        self.set_modified(true);
        Ok(removed)
    }

    /// Copy `source` into `target` (the root when `None`), entries from `position` on
    ///
    /// Runs under a signal blocker, listeners get a single refresh afterwards.
    #[instrument(skip_all, err, fields(format = %self.format))]
    pub fn import_dir(
        &mut self,
        source: &ArchiveDir,
        target: Option<&ArchiveDir>,
        position: Option<usize>,
    ) -> Result<MergeOutcome> {
        let target = self.target_dir(target)?;
        if source.num_subdirs() > 0 {
            self.require_dirs()?;
        }

        let _blocker = self.signals.block();
        let outcome = target.merge(source, position, EntryState::New, Some(&self.descriptor));

        for dir in &outcome.dirs {
            self.signals.emit(ArchiveEvent::DirAdded(dir.clone()));
        }
        for entry in &outcome.entries {
            self.handler.prepare_entry(entry);
            self.signals.emit(ArchiveEvent::EntryAdded(entry.clone()));
        }
        if !outcome.dirs.is_empty() || !outcome.entries.is_empty() {
            self.set_modified(true);
        }

        debug!(
            dirs = outcome.dirs.len(),
            entries = outcome.entries.len(),
            "merged directory"
        );
        Ok(outcome)
    }
}
