//! Shadowcaster LIB archives.
//!
//! LIB files have no signature. The last two bytes hold a u16 lump count and the
//! directory of `count` 21 byte records (u32 size, u32 offset, name\[13\]) sits right before
//! them. Lump data is packed from offset 0.

use std::io::{Cursor, Write};

use binrw::{BinRead, BinResult, BinWrite};
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::{instrument, warn};

use super::{
    check_name, fits, flat_entries, loaded_entry, read_name, reject, to_u32, write_name,
    FormatHandler, OpenContext, PATH_SEPARATORS,
};
use crate::{
    dir::ArchiveDir,
    error::{Error, Result},
    format::ArchiveFormat,
};

/// LIB directory record
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct LibRecord {
    /// Size of the lump data
    pub size: u32,

    /// Offset from the start of the file to the lump data
    pub offset: u32,

    /// NUL terminated name
    pub name: [u8; 13],
}

const RECORD_SIZE: usize = 21;
const FOOTER_SIZE: usize = 2;
const MAX_NAME_LENGTH: usize = 12;

/// Largest lump count the u16 footer can express
pub const MAX_ENTRIES: usize = u16::MAX as usize;

/// Characters never found in a LIB lump name
const FORBIDDEN_NAME_CHARS: &[u8] = b"\"*/:<>?\\|";

/// Whether `raw` holds a plausible DOS filename
fn is_valid_name(raw: &[u8]) -> bool {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    end > 0
        && raw[..end]
            .iter()
            .all(|b| (33..=126).contains(b) && !FORBIDDEN_NAME_CHARS.contains(b))
}

/// Handler for LIB archives
#[derive(Debug, Default, Clone, Copy)]
pub struct LibHandler;

impl LibHandler {
    /// Parse and bounds check the directory in front of the footer of `data`
    fn read_directory(data: &[u8]) -> Result<Vec<LibRecord>> {
        if data.len() < FOOTER_SIZE {
            return Err(Error::invalid("file is too small for a LIB footer"));
        }

        let footer = data.len() - FOOTER_SIZE;
        let count = u16::from_le_bytes([data[footer], data[footer + 1]]) as usize;
        let dir_size = count * RECORD_SIZE;
        if dir_size > footer {
            return Err(Error::invalid(format!(
                "directory of {count} lumps does not fit in the file"
            )));
        }

        let dir_offset = footer - dir_size;
        let mut reader = Cursor::new(&data[dir_offset..footer]);
        let records = (0..count)
            .map(|_| LibRecord::read(&mut reader))
            .collect::<BinResult<Vec<_>>>()?;

        if let Some(first) = records.first() {
            if first.offset != 0 {
                return Err(Error::invalid("first lump does not start at offset 0"));
            }
            if !is_valid_name(&first.name) {
                return Err(Error::invalid("first lump name is not a valid file name"));
            }
        }

        if let Some(bad) = records
            .iter()
            .find(|r| !fits(r.offset as u64, r.size as u64, dir_offset))
        {
            return Err(Error::invalid(format!(
                "lump {} overlaps the directory",
                read_name(&bad.name)
            )));
        }
        for record in &records {
            check_name(&read_name(&record.name), &PATH_SEPARATORS)?;
        }

        Ok(records)
    }
}

impl FormatHandler for LibHandler {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Lib
    }

    /// An empty LIB is two zero bytes, too weak a signal to claim a file
    fn is_this_format(&self, data: &[u8]) -> bool {
        Self::read_directory(data).is_ok_and(|records| !records.is_empty())
    }

    #[instrument(skip_all, err, fields(size = data.len()))]
    fn open(&mut self, data: &[u8], ctx: &mut OpenContext<'_>) -> Result<ArchiveDir> {
        let records = Self::read_directory(data).map_err(|e| reject(self.format(), e))?;

        let root = ctx.new_root();
        let total = records.len();
        for (i, record) in records.iter().enumerate() {
            let start = record.offset as usize;
            let end = start + record.size as usize;
            let entry = loaded_entry(
                read_name(&record.name),
                data[start..end].to_vec(),
                record.offset,
                record.size,
            );
            root.insert_entry(entry, None);
            ctx.report(i + 1, total);
        }

        Ok(root)
    }

    #[instrument(skip_all, err)]
    fn write(&self, root: &ArchiveDir) -> Result<Vec<u8>> {
        let entries = flat_entries(self.format(), root);
        if entries.len() > MAX_ENTRIES {
            warn!(count = entries.len(), "too many entries for a LIB archive");
            return Err(Error::TooManyEntries {
                count: entries.len(),
                max: MAX_ENTRIES,
            });
        }

        let mut offsets = Vec::with_capacity(entries.len());
        let mut position = 0;
        for entry in &entries {
            offsets.push(to_u32(position)?);
            position += entry.size();
        }
        to_u32(position)?;

        let mut writer = Cursor::new(Vec::with_capacity(
            position + entries.len() * RECORD_SIZE + FOOTER_SIZE,
        ));
        for entry in &entries {
            writer.write_all(&entry.data())?;
        }
        for (entry, offset) in entries.iter().zip(&offsets) {
            LibRecord {
                size: entry.size() as u32,
                offset: *offset,
                name: write_name(&entry.name(), MAX_NAME_LENGTH),
            }
            .write(&mut writer)?;
        }
        writer.write_u16::<LittleEndian>(entries.len() as u16)?;

        for (entry, offset) in entries.iter().zip(offsets) {
            entry.set_offset_on_disk(offset);
            entry.set_size_on_disk(entry.size() as u32);
        }

        Ok(writer.into_inner())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{entry::ArchiveEntry, format::FormatDescriptor};

    #[rustfmt::skip]
    const TWO_LUMPS: [u8; 48] = [
        // data
        b'x', b'y', b'z', b'w',
        // CSM.BIN, 3 bytes at 0
        0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        b'C', b'S', b'M', b'.', b'B', b'I', b'N', 0, 0, 0, 0, 0, 0,
        // X.PCX, 1 byte at 3
        0x01, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00,
        b'X', b'.', b'P', b'C', b'X', 0, 0, 0, 0, 0, 0, 0, 0,
        // count
        0x02, 0x00,
    ];

    fn open(data: &[u8]) -> Result<ArchiveDir> {
        let descriptor = FormatDescriptor::builtin_unknown();
        LibHandler.open(data, &mut OpenContext::new(&descriptor, None))
    }

    #[test]
    fn reads_footer_directory() {
        assert!(LibHandler.is_this_format(&TWO_LUMPS));

        let root = open(&TWO_LUMPS).unwrap();

        assert_eq!(root.num_entries(false), 2);
        assert_eq!(&*root.entry("CSM.BIN").unwrap().data(), b"xyz");
        assert_eq!(&*root.entry("X.PCX").unwrap().data(), b"w");
    }

    #[test]
    fn write_matches_fixture() {
        let root = open(&TWO_LUMPS).unwrap();

        let written = LibHandler.write(&root).unwrap();

        assert_eq!(format!("{:02X?}", written), format!("{:02X?}", TWO_LUMPS));
    }

    #[test]
    fn empty_lib_opens_but_is_not_detected() {
        assert!(!LibHandler.is_this_format(&[0, 0]));
        assert!(open(&[0, 0]).unwrap().is_empty());
    }

    #[test]
    fn detection_needs_offset_zero_and_clean_names() {
        let mut shifted = TWO_LUMPS;
        shifted[8] = 0x01;
        assert!(!LibHandler.is_this_format(&shifted));

        let mut bad_name = TWO_LUMPS;
        bad_name[13] = b'?';
        assert!(!LibHandler.is_this_format(&bad_name));
    }

    #[test]
    fn count_larger_than_file_is_invalid() {
        assert!(matches!(open(&[0xFF, 0xFF]), Err(Error::InvalidArchive(_))));
    }

    #[test]
    fn too_many_entries_fails_before_writing() {
        let root = ArchiveDir::new_root(true);
        for _ in 0..=MAX_ENTRIES {
            root.add_entry(ArchiveEntry::new("E"), None, true).unwrap();
        }

        let result = LibHandler.write(&root);

        assert!(matches!(
            result,
            Err(Error::TooManyEntries { count: 65536, max: 65535 })
        ));
    }
}
