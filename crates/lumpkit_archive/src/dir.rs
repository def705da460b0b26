//! Hierarchical namespace of entries.
//!
//! A directory owns its entries and subdirectories in insertion order. Order is significant:
//! flat formats write their lumps in exactly this order and derive offsets from it.
//! Parents are held weakly so a detached subtree simply reports no parent.

use std::{
    cell::RefCell,
    fmt::{self, Debug},
    rc::{Rc, Weak},
};

use tracing::debug;

use crate::{
    entry::{ArchiveEntry, EntryState},
    error::{Error, Result},
    format::FormatDescriptor,
};

pub(crate) struct DirData {
    name: String,
    entries: Vec<ArchiveEntry>,
    subdirs: Vec<ArchiveDir>,
    dir_entry: Option<ArchiveEntry>,
    parent: Weak<RefCell<DirData>>,
    allow_duplicate_names: bool,
}

/// Shared handle to a directory node
#[derive(Clone)]
pub struct ArchiveDir(Rc<RefCell<DirData>>);

impl Debug for ArchiveDir {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dir = self.0.borrow();
        f.debug_struct("ArchiveDir")
            .field("name", &dir.name)
            .field("entries", &dir.entries.len())
            .field("subdirs", &dir.subdirs.len())
            .finish()
    }
}

/// Nodes created by [`ArchiveDir::merge`]
#[derive(Debug, Default, Clone)]
pub struct MergeOutcome {
    /// Directories that did not exist in the target before the merge
    pub dirs: Vec<ArchiveDir>,

    /// Every entry copied into the target
    pub entries: Vec<ArchiveEntry>,
}

impl ArchiveDir {
    /// Create a detached directory along with its pseudo-entry
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let dir_entry = ArchiveEntry::new(name.clone());
        Self::build(name, Some(dir_entry), false)
    }

    /// Create a nameless root directory
    pub fn new_root(allow_duplicate_names: bool) -> Self {
        Self::build(String::new(), None, allow_duplicate_names)
    }

    fn build(name: String, dir_entry: Option<ArchiveEntry>, allow_duplicate_names: bool) -> Self {
        ArchiveDir(Rc::new(RefCell::new(DirData {
            name,
            entries: Vec::new(),
            subdirs: Vec::new(),
            dir_entry,
            parent: Weak::new(),
            allow_duplicate_names,
        })))
    }

    pub(crate) fn from_inner(inner: Rc<RefCell<DirData>>) -> Self {
        ArchiveDir(inner)
    }

    fn downgrade(&self) -> Weak<RefCell<DirData>> {
        Rc::downgrade(&self.0)
    }

    /// Name of the directory, empty for a root
    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    /// Parent directory, `None` for a root or a detached directory
    pub fn parent(&self) -> Option<ArchiveDir> {
        self.0.borrow().parent.upgrade().map(ArchiveDir)
    }

    /// `/` separated path from the root, empty for the root itself
    pub fn path(&self) -> String {
        let mut names = vec![self.name()];
        let mut current = self.parent();
        while let Some(dir) = current {
            names.push(dir.name());
            current = dir.parent();
        }

        names
            .into_iter()
            .rev()
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Entry representing this directory in formats that list directories inline
    pub fn dir_entry(&self) -> Option<ArchiveEntry> {
        self.0.borrow().dir_entry.clone()
    }

    /// Whether several entries may share a name here
    pub fn allow_duplicate_names(&self) -> bool {
        self.0.borrow().allow_duplicate_names
    }

    /// Change the duplicate name policy for this directory and all below it
    pub fn set_allow_duplicate_names(&self, allow: bool) {
        self.0.borrow_mut().allow_duplicate_names = allow;
        for subdir in self.subdirs() {
            subdir.set_allow_duplicate_names(allow);
        }
    }

    /// Rename the directory, failing if a sibling directory already has the name
    pub fn rename(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidName(name.to_owned()));
        }

        if let Some(parent) = self.parent() {
            let taken = parent
                .subdirs()
                .iter()
                .any(|sibling| !sibling.ptr_eq(self) && sibling.name().eq_ignore_ascii_case(name));
            if taken && !parent.allow_duplicate_names() {
                return Err(Error::InvalidName(name.to_owned()));
            }
        }

        let mut dir = self.0.borrow_mut();
        dir.name = name.to_owned();
        if let Some(entry) = &dir.dir_entry {
            entry.set_name_unchecked(name);
            entry.mark_modified();
        }
        Ok(())
    }

    /// Number of entries, optionally counting every entry below this directory
    pub fn num_entries(&self, include_subdirs: bool) -> usize {
        let dir = self.0.borrow();
        let mut count = dir.entries.len();
        if include_subdirs {
            count += dir
                .subdirs
                .iter()
                .map(|subdir| subdir.num_entries(true))
                .sum::<usize>();
        }
        count
    }

    /// Number of direct subdirectories
    pub fn num_subdirs(&self) -> usize {
        self.0.borrow().subdirs.len()
    }

    /// Whether the directory holds neither entries nor subdirectories
    pub fn is_empty(&self) -> bool {
        let dir = self.0.borrow();
        dir.entries.is_empty() && dir.subdirs.is_empty()
    }

    /// Handles to the direct entries, in order
    pub fn entries(&self) -> Vec<ArchiveEntry> {
        self.0.borrow().entries.clone()
    }

    /// Handles to the direct subdirectories, in order
    pub fn subdirs(&self) -> Vec<ArchiveDir> {
        self.0.borrow().subdirs.clone()
    }

    /// Entry at `index`
    pub fn entry_at(&self, index: usize) -> Option<ArchiveEntry> {
        self.0.borrow().entries.get(index).cloned()
    }

    /// First entry named `name` (case-insensitive)
    pub fn entry(&self, name: &str) -> Option<ArchiveEntry> {
        self.0
            .borrow()
            .entries
            .iter()
            .find(|entry| entry.name_is(name))
            .cloned()
    }

    /// Position of `entry` in this directory, searching from `start_from`
    pub fn entry_index(&self, entry: &ArchiveEntry, start_from: usize) -> Option<usize> {
        self.0
            .borrow()
            .entries
            .iter()
            .enumerate()
            .skip(start_from)
            .find(|(_, candidate)| candidate.ptr_eq(entry))
            .map(|(index, _)| index)
    }

    /// Whether an entry other than `except` already uses `name` (case-insensitive)
    pub(crate) fn name_taken(&self, name: &str, except: Option<&ArchiveEntry>) -> bool {
        self.0.borrow().entries.iter().any(|entry| {
            !except.is_some_and(|except| except.ptr_eq(entry)) && entry.name_is(name)
        })
    }

    /// Insert `entry` at `index`, appending when `index` is `None` or past the end
    ///
    /// Unless `ignore_name_conflict` is set, fails with [`Error::DuplicateName`] when the
    /// directory disallows duplicates and a sibling entry already has the name.
    pub fn add_entry(
        &self,
        entry: ArchiveEntry,
        index: Option<usize>,
        ignore_name_conflict: bool,
    ) -> Result<ArchiveEntry> {
        if entry.parent().is_some() {
            return Err(Error::CustomError(format!(
                "{} already belongs to a directory",
                entry.name()
            )));
        }

        let name = entry.name();
        if !ignore_name_conflict && !self.allow_duplicate_names() && self.name_taken(&name, None)
        {
            return Err(Error::DuplicateName(name));
        }

        if entry.is_deleted() {
            entry.set_state(EntryState::New);
        }
        self.insert_entry(entry.clone(), index);
        Ok(entry)
    }

    pub(crate) fn insert_entry(&self, entry: ArchiveEntry, index: Option<usize>) {
        entry.set_parent(self.downgrade());
        let mut dir = self.0.borrow_mut();
        let index = index
            .filter(|i| *i <= dir.entries.len())
            .unwrap_or(dir.entries.len());
        dir.entries.insert(index, entry);
    }

    /// Detach the entry at `index`
    ///
    /// The entry is tagged [`EntryState::Deleted`] and stays usable through any handle still held.
    pub fn remove_entry(&self, index: usize) -> Result<ArchiveEntry> {
        let entry = {
            let mut dir = self.0.borrow_mut();
            if index >= dir.entries.len() {
                return Err(Error::IndexOutOfRange(index));
            }
            dir.entries.remove(index)
        };

        entry.set_parent(Weak::new());
        entry.set_state(EntryState::Deleted);
        Ok(entry)
    }

    /// Move the entry at `from` so it ends up at `to`
    pub fn move_entry(&self, from: usize, to: usize) -> Result<()> {
        let mut dir = self.0.borrow_mut();
        let len = dir.entries.len();
        if from >= len {
            return Err(Error::IndexOutOfRange(from));
        }
        if to >= len {
            return Err(Error::IndexOutOfRange(to));
        }

        let entry = dir.entries.remove(from);
        dir.entries.insert(to, entry);
        Ok(())
    }

    /// Swap the entries at `a` and `b`
    pub fn swap_entries(&self, a: usize, b: usize) -> Result<()> {
        let mut dir = self.0.borrow_mut();
        let len = dir.entries.len();
        if let Some(bad) = [a, b].into_iter().find(|i| *i >= len) {
            return Err(Error::IndexOutOfRange(bad));
        }

        dir.entries.swap(a, b);
        Ok(())
    }

    /// Subdirectory named `name` (case-insensitive)
    pub fn subdir(&self, name: &str) -> Option<ArchiveDir> {
        self.0
            .borrow()
            .subdirs
            .iter()
            .find(|dir| dir.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Subdirectory at `index`
    pub fn subdir_at(&self, index: usize) -> Option<ArchiveDir> {
        self.0.borrow().subdirs.get(index).cloned()
    }

    /// Attach `subdir` at `index` (appending when `None` or past the end)
    pub fn add_subdir(&self, subdir: ArchiveDir, index: Option<usize>) -> Result<ArchiveDir> {
        if subdir.parent().is_some() {
            return Err(Error::CustomError(format!(
                "{} already belongs to a directory",
                subdir.name()
            )));
        }

        let name = subdir.name();
        if name.is_empty() {
            return Err(Error::InvalidName(name));
        }
        if !self.allow_duplicate_names() && self.subdir(&name).is_some() {
            return Err(Error::DuplicateName(name));
        }

        self.insert_subdir(subdir.clone(), index);
        Ok(subdir)
    }

    fn insert_subdir(&self, subdir: ArchiveDir, index: Option<usize>) {
        {
            let mut child = subdir.0.borrow_mut();
            child.parent = self.downgrade();
            if let Some(entry) = &child.dir_entry {
                entry.set_parent(self.downgrade());
            }
        }

        let mut dir = self.0.borrow_mut();
        let index = index
            .filter(|i| *i <= dir.subdirs.len())
            .unwrap_or(dir.subdirs.len());
        dir.subdirs.insert(index, subdir);
    }

    fn create_child(&self, name: &str) -> ArchiveDir {
        let subdir = ArchiveDir::new(name);
        subdir.0.borrow_mut().allow_duplicate_names = self.allow_duplicate_names();
        self.insert_subdir(subdir.clone(), None);
        subdir
    }

    /// Resolve `path` below this directory, creating missing directories on the way
    ///
    /// Returns the final directory together with every directory that had to be created.
    pub fn get_or_create_subdir(&self, path: &str) -> (ArchiveDir, Vec<ArchiveDir>) {
        let mut created = Vec::new();
        let mut current = self.clone();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current = match current.subdir(component) {
                Some(existing) => existing,
                None => {
                    let subdir = current.create_child(component);
                    created.push(subdir.clone());
                    subdir
                }
            };
        }
        (current, created)
    }

    /// Resolve `path` below this directory, `""` and `"/"` resolve to the directory itself
    pub fn dir_at_path(&self, path: &str) -> Option<ArchiveDir> {
        let mut current = self.clone();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current = current.subdir(component)?;
        }
        Some(current)
    }

    /// Detach the subdirectory named `name`
    ///
    /// Every entry below it is tagged [`EntryState::Deleted`].
    pub fn remove_subdir(&self, name: &str) -> Option<ArchiveDir> {
        let subdir = self.subdir(name)?;
        self.detach_subdir(&subdir)
    }

    /// Detach `subdir` itself, `None` if it is not a child of this directory
    ///
    /// Every entry below it is tagged [`EntryState::Deleted`].
    pub fn detach_subdir(&self, subdir: &ArchiveDir) -> Option<ArchiveDir> {
        let removed = {
            let mut dir = self.0.borrow_mut();
            let index = dir.subdirs.iter().position(|child| child.ptr_eq(subdir))?;
            dir.subdirs.remove(index)
        };

        removed.0.borrow_mut().parent = Weak::new();
        for entry in removed.entry_tree_as_list(true) {
            entry.set_state(EntryState::Deleted);
        }
        if let Some(entry) = removed.dir_entry() {
            entry.set_parent(Weak::new());
            entry.set_state(EntryState::Deleted);
        }
        Some(removed)
    }

    /// Flatten every entry below this directory, depth-first and pre-order
    ///
    /// Subdirectories come before the entries of the directory holding them. With
    /// `include_dir_entries` each subdirectory's pseudo-entry precedes its contents.
    pub fn entry_tree_as_list(&self, include_dir_entries: bool) -> Vec<ArchiveEntry> {
        let mut list = Vec::new();
        self.collect_entries(&mut list, include_dir_entries);
        list
    }

    fn collect_entries(&self, list: &mut Vec<ArchiveEntry>, include_dir_entries: bool) {
        for subdir in self.subdirs() {
            if include_dir_entries {
                if let Some(entry) = subdir.dir_entry() {
                    list.push(entry);
                }
            }
            subdir.collect_entries(list, include_dir_entries);
        }
        list.extend(self.entries());
    }

    /// Set the state of every entry below this directory, pseudo-entries included
    pub fn set_tree_state(&self, state: EntryState) {
        for entry in self.entry_tree_as_list(true) {
            entry.set_state(state);
        }
    }

    /// Deep copy of this subtree with new identities
    ///
    /// When `parent` is given the copy is attached to it.
    pub fn clone_tree(&self, parent: Option<&ArchiveDir>) -> Result<ArchiveDir> {
        let copy = {
            let dir = self.0.borrow();
            Self::build(
                dir.name.clone(),
                dir.dir_entry.as_ref().map(ArchiveEntry::duplicate),
                dir.allow_duplicate_names,
            )
        };

        for entry in self.entries() {
            copy.insert_entry(entry.duplicate(), None);
        }
        for subdir in self.subdirs() {
            let child = subdir.clone_tree(None)?;
            copy.insert_subdir(child, None);
        }

        match parent {
            Some(parent) => parent.add_subdir(copy, None),
            None => Ok(copy),
        }
    }

    /// Copy the contents of `source` into this directory
    ///
    /// Subdirectory structure is preserved, merging into same-named directories that already
    /// exist. Top-level entries are inserted from `position` on, entries in subdirectories are
    /// appended. Every copy is tagged `state`. With a `descriptor`, entry names are normalised
    /// for its format before they are compared. A name collision in a directory disallowing
    /// duplicates gets a numeric suffix instead of failing the merge.
    pub fn merge(
        &self,
        source: &ArchiveDir,
        position: Option<usize>,
        state: EntryState,
        descriptor: Option<&FormatDescriptor>,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        self.merge_into(source, position, state, descriptor, &mut outcome);
        outcome
    }

    fn merge_into(
        &self,
        source: &ArchiveDir,
        position: Option<usize>,
        state: EntryState,
        descriptor: Option<&FormatDescriptor>,
        outcome: &mut MergeOutcome,
    ) {
        for subdir in source.subdirs() {
            let name = subdir.name();
            let target = match self.subdir(&name) {
                Some(existing) => existing,
                None => {
                    let created = self.create_child(&name);
                    if let Some(entry) = created.dir_entry() {
                        entry.set_state(state);
                    }
                    outcome.dirs.push(created.clone());
                    created
                }
            };
            target.merge_into(&subdir, None, state, descriptor, outcome);
        }

        let max_name_length = descriptor.and_then(|d| d.max_name_length);
        let mut index = position;
        for entry in source.entries() {
            let copy = entry.duplicate();
            copy.set_state(state);

            let name = match descriptor {
                Some(descriptor) => descriptor.normalise_name(&copy.name()),
                None => copy.name(),
            };
            if !self.allow_duplicate_names() && self.name_taken(&name, None) {
                let unique = self.unique_entry_name(&name, max_name_length);
                debug!("merge renamed {name} to {unique} to avoid a collision");
                copy.set_name_unchecked(&unique);
            } else {
                copy.set_name_unchecked(&name);
            }

            self.insert_entry(copy.clone(), index);
            index = index.map(|i| i + 1);
            outcome.entries.push(copy);
        }
    }

    /// First `stem_N.ext` variant of `name` not used by an entry here
    ///
    /// With `max_len` the stem is shortened so the variant stays within that many characters.
    pub fn unique_entry_name(&self, name: &str, max_len: Option<usize>) -> String {
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
            _ => (name, String::new()),
        };

        (2..)
            .map(|n| {
                let suffix = format!("_{n}");
                let Some(max) = max_len else {
                    return format!("{stem}{suffix}{ext}");
                };

                let tail = format!("{suffix}{ext}");
                let tail_len = tail.chars().count();
                if tail_len < max {
                    let kept: String = stem.chars().take(max - tail_len).collect();
                    format!("{kept}{tail}")
                } else {
                    // no room for the extension
                    let kept: String = stem
                        .chars()
                        .take(max.saturating_sub(suffix.len()))
                        .collect();
                    format!("{kept}{suffix}")
                }
            })
            .take(u16::MAX as usize)
            .find(|candidate| !self.name_taken(candidate, None))
            .unwrap_or_else(|| name.to_owned())
    }

    /// Find the directory whose pseudo-entry is `entry`, searching `root` and everything below
    pub fn find_dir_by_dir_entry(root: &ArchiveDir, entry: &ArchiveEntry) -> Option<ArchiveDir> {
        if root.dir_entry().is_some_and(|own| own.ptr_eq(entry)) {
            return Some(root.clone());
        }

        root.subdirs()
            .iter()
            .find_map(|subdir| Self::find_dir_by_dir_entry(subdir, entry))
    }

    /// Whether both handles refer to the same directory
    pub fn ptr_eq(&self, other: &ArchiveDir) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
