//! Format handlers translating between bytes and a directory tree.
//!
//! Every handler validates the whole structure (magic, directory bounds, lump bounds)
//! before it creates a single entry, so a rejected buffer never yields a partial tree.
//! The detection predicates run the same validation and have no side effects.

pub mod dir;
pub mod gob;
pub mod hog;
pub mod lib;
pub mod pak;
pub mod rff;
pub mod wad;

use std::fmt::Debug;
use std::path::Path;

use tracing::warn;

use crate::{
    dir::ArchiveDir,
    entry::ArchiveEntry,
    error::{Error, Result},
    format::{ArchiveFormat, FormatDescriptor},
};

pub use dir::DirHandler;
pub use gob::GobHandler;
pub use hog::HogHandler;
pub use lib::LibHandler;
pub use pak::PakHandler;
pub use rff::RffHandler;
pub use wad::WadHandler;

/// How many records are parsed between two progress reports
const PROGRESS_INTERVAL: usize = 64;

/// Buffer based formats, in the order they are sniffed
///
/// LIB goes last, its footer heuristic is the easiest to satisfy by accident.
pub const DETECTION_ORDER: [ArchiveFormat; 6] = [
    ArchiveFormat::Rff,
    ArchiveFormat::Gob,
    ArchiveFormat::Wad,
    ArchiveFormat::Pak,
    ArchiveFormat::Hog,
    ArchiveFormat::Lib,
];

/// State handed to [`FormatHandler::open`]
pub struct OpenContext<'a> {
    descriptor: &'a FormatDescriptor,
    progress: Option<&'a mut dyn FnMut(usize, usize)>,
}

impl<'a> OpenContext<'a> {
    /// Context for loading an archive described by `descriptor`
    pub fn new(
        descriptor: &'a FormatDescriptor,
        progress: Option<&'a mut dyn FnMut(usize, usize)>,
    ) -> Self {
        OpenContext {
            descriptor,
            progress,
        }
    }

    /// Descriptor of the format being loaded
    pub fn descriptor(&self) -> &FormatDescriptor {
        self.descriptor
    }

    /// Empty root honouring the format's duplicate name policy
    pub fn new_root(&self) -> ArchiveDir {
        ArchiveDir::new_root(self.descriptor.allow_duplicate_names)
    }

    /// Report that `done` of `total` records have been parsed
    ///
    /// Only every [`PROGRESS_INTERVAL`]th call and the final one reach the callback.
    pub fn report(&mut self, done: usize, total: usize) {
        if done % PROGRESS_INTERVAL != 0 && done != total {
            return;
        }
        if let Some(progress) = self.progress.as_mut() {
            progress(done, total);
        }
    }
}

/// Bidirectional mapping between one archive format and the directory tree
pub trait FormatHandler: Debug {
    /// The format handled
    fn format(&self) -> ArchiveFormat;

    /// Whether `data` is a structurally valid archive of this format
    fn is_this_format(&self, data: &[u8]) -> bool;

    /// Whether the file at `path` is a structurally valid archive of this format
    fn is_this_format_file(&self, path: &Path) -> bool {
        std::fs::read(path)
            .map(|data| self.is_this_format(&data))
            .unwrap_or(false)
    }

    /// Parse `data` into a new root directory
    ///
    /// Entries come back tagged [`crate::EntryState::Unmodified`].
    fn open(&mut self, data: &[u8], ctx: &mut OpenContext<'_>) -> Result<ArchiveDir>;

    /// Serialize the tree under `root`
    ///
    /// Records each entry's new offset and size on disk once the whole archive is laid out.
    fn write(&self, root: &ArchiveDir) -> Result<Vec<u8>>;

    /// Load an archive from the filesystem
    fn open_path(&mut self, path: &Path, ctx: &mut OpenContext<'_>) -> Result<ArchiveDir> {
        let data = std::fs::read(path)?;
        self.open(&data, ctx)
    }

    /// Save an archive to the filesystem
    fn write_path(&self, root: &ArchiveDir, path: &Path) -> Result<()> {
        let data = self.write(root)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Whether [`FormatHandler::write`] can succeed at all
    fn can_write(&self) -> bool {
        true
    }

    /// Rename `entry`, applying any format specific side effects
    fn rename_entry(&self, entry: &ArchiveEntry, name: &str) -> Result<()> {
        entry.rename(name)
    }

    /// Adjust an entry about to be added to an archive of this format
    fn prepare_entry(&self, _entry: &ArchiveEntry) {}
}

/// Fresh handler for `format`, `None` for [`ArchiveFormat::Unknown`]
pub fn handler_for(format: ArchiveFormat) -> Option<Box<dyn FormatHandler>> {
    Some(match format {
        ArchiveFormat::Dir => Box::new(DirHandler),
        ArchiveFormat::Gob => Box::new(GobHandler),
        ArchiveFormat::Hog => Box::new(HogHandler),
        ArchiveFormat::Lib => Box::new(LibHandler),
        ArchiveFormat::Rff => Box::new(RffHandler),
        ArchiveFormat::Wad => Box::<WadHandler>::default(),
        ArchiveFormat::Pak => Box::new(PakHandler),
        ArchiveFormat::Unknown => return None,
    })
}

/// Sniff the format of `data`
pub fn detect_format(data: &[u8]) -> ArchiveFormat {
    DETECTION_ORDER
        .into_iter()
        .find(|format| handler_for(*format).is_some_and(|handler| handler.is_this_format(data)))
        .unwrap_or(ArchiveFormat::Unknown)
}

/// Sniff the format of the file or folder at `path`
pub fn detect_format_file(path: &Path) -> ArchiveFormat {
    if path.is_dir() {
        return ArchiveFormat::Dir;
    }

    match std::fs::read(path) {
        Ok(data) => detect_format(&data),
        Err(e) => {
            warn!("unable to read {}: {e}", path.display());
            ArchiveFormat::Unknown
        }
    }
}

/// Decode a NUL padded fixed width name
pub(crate) fn read_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Characters that split a name into path components
pub(crate) const PATH_SEPARATORS: [char; 2] = ['/', '\\'];

/// Reject names that would escape the folder they are extracted to
pub(crate) fn check_name(name: &str, forbidden: &[char]) -> Result<()> {
    if name == "." || name == ".." || name.contains(forbidden) {
        return Err(Error::invalid(format!("unsafe entry name '{name}'")));
    }
    Ok(())
}

/// Encode `name` into a NUL padded field of `N` bytes
///
/// At most `max` bytes of the name are kept, a warning is logged when it has to be cut.
pub(crate) fn write_name<const N: usize>(name: &str, max: usize) -> [u8; N] {
    let bytes = name.as_bytes();
    let len = bytes.len().min(max).min(N);
    if len < bytes.len() {
        warn!("truncating entry name {name} to {len} bytes");
    }

    let mut field = [0u8; N];
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

/// Whether `size` bytes at `offset` fit in a buffer of `len` bytes
pub(crate) fn fits(offset: u64, size: u64, len: usize) -> bool {
    offset
        .checked_add(size)
        .is_some_and(|end| end <= len as u64)
}

/// Convert a layout position to the 32-bit field every format here stores
pub(crate) fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::CustomError(format!("offset {value} does not fit in 32 bits")))
}

/// Entry read from disk, remembering where it came from
pub(crate) fn loaded_entry(name: String, data: Vec<u8>, offset: u32, size: u32) -> ArchiveEntry {
    let entry = ArchiveEntry::with_data(name, data);
    entry.set_offset_on_disk(offset);
    entry.set_size_on_disk(size);
    entry.set_state(crate::entry::EntryState::Unmodified);
    entry
}

/// Log a reject and pass the error on
pub(crate) fn reject(format: ArchiveFormat, e: Error) -> Error {
    warn!("unable to open {format} archive: {e}");
    e
}

/// Flat formats keep entries in the root only
pub(crate) fn flat_entries(format: ArchiveFormat, root: &ArchiveDir) -> Vec<ArchiveEntry> {
    if root.num_subdirs() > 0 {
        warn!("{format} archives have no directories, subdirectory contents are not written");
    }
    root.entries()
}
