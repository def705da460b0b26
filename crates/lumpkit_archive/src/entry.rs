//! A single named blob inside an archive.

use std::{
    cell::{Ref, RefCell},
    fmt::{self, Debug},
    rc::{Rc, Weak},
};

use derive_more::Display;

use crate::{
    detect::EntryType,
    dir::{ArchiveDir, DirData},
    error::{Error, Result},
};

const CRC_32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// Modification state of an entry relative to the file it was loaded from
#[derive(Debug, Display, Copy, Clone, Default, PartialEq, Eq)]
pub enum EntryState {
    /// Identical to what is on disk
    #[default]
    Unmodified,

    /// Changed since the last load or write
    Modified,

    /// Not present on disk yet
    New,

    /// Removed from its directory while a handle to it was still alive
    Deleted,
}

/// Content transform applied to an entry's data on disk
///
/// The tag alone never changes the in-memory buffer, format handlers apply the cipher at
/// load and write time.
#[derive(Debug, Display, Copy, Clone, Default, PartialEq, Eq)]
pub enum Encryption {
    /// Stored as is
    #[default]
    None,

    /// Descent text rotate-and-xor cipher
    #[display("TXB")]
    Txb,

    /// Blood RFF xor keystream
    Blood,
}

pub(crate) struct EntryData {
    name: String,
    data: Vec<u8>,
    offset_on_disk: u32,
    size_on_disk: u32,
    encryption: Encryption,
    state: EntryState,
    detected_type: Weak<EntryType>,
    parent: Weak<RefCell<DirData>>,
}

/// Shared handle to an archive entry
///
/// Cloning the handle does not copy the entry, use [`ArchiveEntry::duplicate`] for that.
/// An entry removed from its directory stays alive for as long as a handle to it exists
/// and reports [`EntryState::Deleted`].
#[derive(Clone)]
pub struct ArchiveEntry(Rc<RefCell<EntryData>>);

impl Debug for ArchiveEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let entry = self.0.borrow();
        f.debug_struct("ArchiveEntry")
            .field("name", &entry.name)
            .field("size", &entry.data.len())
            .field("encryption", &entry.encryption)
            .field("state", &entry.state)
            .finish()
    }
}

impl ArchiveEntry {
    /// Create an empty entry, tagged [`EntryState::New`]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_data(name, Vec::new())
    }

    /// Create an entry owning `data`, tagged [`EntryState::New`]
    pub fn with_data(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        ArchiveEntry(Rc::new(RefCell::new(EntryData {
            name: name.into(),
            data: data.into(),
            offset_on_disk: 0,
            size_on_disk: 0,
            encryption: Encryption::None,
            state: EntryState::New,
            detected_type: Weak::new(),
            parent: Weak::new(),
        })))
    }

    /// Name of the entry
    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    /// Case-insensitive name comparison
    pub fn name_is(&self, name: &str) -> bool {
        self.0.borrow().name.eq_ignore_ascii_case(name)
    }

    /// Text after the last `.` of the name, empty if there is none
    pub fn extension(&self) -> String {
        let entry = self.0.borrow();
        entry
            .name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_owned())
            .unwrap_or_default()
    }

    /// Path from the archive root, `/` separated, without a leading slash
    pub fn path(&self) -> String {
        let name = self.name();
        match self.parent().map(|dir| dir.path()) {
            Some(dir) if !dir.is_empty() => format!("{dir}/{name}"),
            _ => name,
        }
    }

    /// Size of the in-memory data
    pub fn size(&self) -> usize {
        self.0.borrow().data.len()
    }

    /// Borrow the in-memory data
    pub fn data(&self) -> Ref<'_, [u8]> {
        Ref::map(self.0.borrow(), |entry| entry.data.as_slice())
    }

    /// Copy the in-memory data out
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.borrow().data.clone()
    }

    /// CRC-32 of the in-memory data
    pub fn crc32(&self) -> u32 {
        CRC_32.checksum(&self.0.borrow().data)
    }

    /// Replace the data with a copy of `buffer`
    pub fn import_buffer(&self, buffer: &[u8]) {
        self.0.borrow_mut().data = buffer.to_vec();
        self.mark_modified();
    }

    /// Replace the data with `length` bytes of `buffer` starting at `offset`
    pub fn import_range(&self, buffer: &[u8], offset: usize, length: usize) -> Result<()> {
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= buffer.len())
            .ok_or(Error::IndexOutOfRange(offset.saturating_add(length)))?;

        self.import_buffer(&buffer[offset..end]);
        Ok(())
    }

    /// Take ownership of `data` as the new content
    pub fn import_vec(&self, data: Vec<u8>) {
        self.0.borrow_mut().data = data;
        self.mark_modified();
    }

    /// The encryption tag
    pub fn encryption(&self) -> Encryption {
        self.0.borrow().encryption
    }

    /// Set the encryption tag, the data is left untouched
    pub fn set_encryption(&self, encryption: Encryption) {
        self.0.borrow_mut().encryption = encryption;
    }

    /// Current modification state
    pub fn state(&self) -> EntryState {
        self.0.borrow().state
    }

    /// Overwrite the modification state
    pub fn set_state(&self, state: EntryState) {
        self.0.borrow_mut().state = state;
    }

    /// Flag a content or name change, new entries stay new
    pub fn mark_modified(&self) {
        let mut entry = self.0.borrow_mut();
        if entry.state != EntryState::New {
            entry.state = EntryState::Modified;
        }
    }

    /// Whether the entry has been removed from its directory
    pub fn is_deleted(&self) -> bool {
        self.state() == EntryState::Deleted
    }

    /// Data offset recorded by the last load or write
    pub fn offset_on_disk(&self) -> u32 {
        self.0.borrow().offset_on_disk
    }

    /// Record where the data lives on disk
    pub fn set_offset_on_disk(&self, offset: u32) {
        self.0.borrow_mut().offset_on_disk = offset;
    }

    /// Stored size recorded by the last load or write
    pub fn size_on_disk(&self) -> u32 {
        self.0.borrow().size_on_disk
    }

    /// Record how many bytes the data takes on disk
    pub fn set_size_on_disk(&self, size: u32) {
        self.0.borrow_mut().size_on_disk = size;
    }

    /// The detected type, if one was assigned and its registry is still alive
    pub fn detected_type(&self) -> Option<Rc<EntryType>> {
        self.0.borrow().detected_type.upgrade()
    }

    /// Point the entry at a registered type
    pub fn set_detected_type(&self, entry_type: &Rc<EntryType>) {
        self.0.borrow_mut().detected_type = Rc::downgrade(entry_type);
    }

    /// Directory currently holding this entry
    pub fn parent(&self) -> Option<ArchiveDir> {
        self.0.borrow().parent.upgrade().map(ArchiveDir::from_inner)
    }

    pub(crate) fn set_parent(&self, parent: Weak<RefCell<DirData>>) {
        self.0.borrow_mut().parent = parent;
    }

    /// Rename the entry
    ///
    /// Fails with [`Error::InvalidName`] when the name is empty, contains a path separator, or
    /// collides (case-insensitively) with a sibling in a directory that disallows duplicates.
    pub fn rename(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidName(name.to_owned()));
        }

        if let Some(parent) = self.parent() {
            if !parent.allow_duplicate_names() && parent.name_taken(name, Some(self)) {
                return Err(Error::InvalidName(name.to_owned()));
            }
        }

        self.set_name_unchecked(name);
        self.mark_modified();
        Ok(())
    }

    pub(crate) fn set_name_unchecked(&self, name: &str) {
        self.0.borrow_mut().name = name.to_owned();
    }

    /// Copy the entry into a new, detached identity
    ///
    /// Name, data, encryption, state and detected type are kept.
    pub fn duplicate(&self) -> ArchiveEntry {
        let entry = self.0.borrow();
        ArchiveEntry(Rc::new(RefCell::new(EntryData {
            name: entry.name.clone(),
            data: entry.data.clone(),
            offset_on_disk: entry.offset_on_disk,
            size_on_disk: entry.size_on_disk,
            encryption: entry.encryption,
            state: entry.state,
            detected_type: entry.detected_type.clone(),
            parent: Weak::new(),
        })))
    }

    /// Whether both handles refer to the same entry
    pub fn ptr_eq(&self, other: &ArchiveEntry) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
