//! Descent HOG archives.
//!
//! A `DHF` signature followed by a plain stream of lumps, each one a 13 byte NUL padded
//! name, a u32 size and the data. There is no directory and no padding.
//!
//! Lumps named `*.txb` or `*.ctb` hold text obfuscated with the TXB cipher. They are
//! decoded on load, tagged [`Encryption::Txb`] and encoded again on save.

use std::io::{Cursor, Write};

use binrw::{BinRead, BinWrite};
use tracing::{debug, instrument};

use super::{
    check_name, flat_entries, loaded_entry, read_name, reject, to_u32, write_name, FormatHandler,
    OpenContext, PATH_SEPARATORS,
};
use crate::{
    cipher::{txb_decode, txb_encode},
    dir::ArchiveDir,
    entry::{ArchiveEntry, Encryption},
    error::{Error, Result},
    format::ArchiveFormat,
};

/// HOG lump header
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct HogRecord {
    /// NUL terminated name
    pub name: [u8; 13],

    /// Size of the data following the header
    pub size: u32,
}

const MAGIC: &[u8; 3] = b"DHF";
const RECORD_SIZE: usize = 17;
const MAX_NAME_LENGTH: usize = 12;

/// Whether lumps named `name` are stored TXB encoded
pub fn is_txb_name(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(_, ext)| {
        ext.eq_ignore_ascii_case("txb") || ext.eq_ignore_ascii_case("ctb")
    })
}

/// Handler for HOG archives
#[derive(Debug, Default, Clone, Copy)]
pub struct HogHandler;

impl HogHandler {
    /// Walk the lump stream of `data`, returning each header with the offset of its data
    fn read_records(data: &[u8]) -> Result<Vec<(HogRecord, usize)>> {
        if !data.starts_with(MAGIC) {
            return Err(Error::invalid("missing HOG signature"));
        }

        let mut records = Vec::new();
        let mut offset = MAGIC.len();
        while offset < data.len() {
            let start = offset + RECORD_SIZE;
            if start > data.len() {
                return Err(Error::invalid(format!(
                    "truncated lump header at offset {offset}"
                )));
            }

            let record = HogRecord::read(&mut Cursor::new(&data[offset..start]))?;
            let end = start
                .checked_add(record.size as usize)
                .filter(|end| *end <= data.len())
                .ok_or_else(|| {
                    Error::invalid(format!(
                        "lump {} runs past the end of the file",
                        read_name(&record.name)
                    ))
                })?;
            check_name(&read_name(&record.name), &PATH_SEPARATORS)?;

            records.push((record, start));
            offset = end;
        }

        Ok(records)
    }
}

impl FormatHandler for HogHandler {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Hog
    }

    fn is_this_format(&self, data: &[u8]) -> bool {
        Self::read_records(data).is_ok()
    }

    #[instrument(skip_all, err, fields(size = data.len()))]
    fn open(&mut self, data: &[u8], ctx: &mut OpenContext<'_>) -> Result<ArchiveDir> {
        let records = Self::read_records(data).map_err(|e| reject(self.format(), e))?;

        let root = ctx.new_root();
        let total = records.len();
        for (i, (record, start)) in records.iter().enumerate() {
            let name = read_name(&record.name);
            let mut lump = data[*start..*start + record.size as usize].to_vec();
            let encrypted = is_txb_name(&name);
            if encrypted {
                txb_decode(&mut lump);
            }

            let entry = loaded_entry(name, lump, to_u32(*start)?, record.size);
            if encrypted {
                entry.set_encryption(Encryption::Txb);
            }
            root.insert_entry(entry, None);
            ctx.report(i + 1, total);
        }

        Ok(root)
    }

    #[instrument(skip_all, err)]
    fn write(&self, root: &ArchiveDir) -> Result<Vec<u8>> {
        let entries = flat_entries(self.format(), root);

        let mut offsets = Vec::with_capacity(entries.len());
        let mut position = MAGIC.len();
        for entry in &entries {
            position += RECORD_SIZE;
            offsets.push(to_u32(position)?);
            position += entry.size();
        }
        to_u32(position)?;

        let mut writer = Cursor::new(Vec::with_capacity(position));
        writer.write_all(MAGIC)?;
        for entry in &entries {
            let mut lump = entry.to_vec();
            if entry.encryption() == Encryption::Txb {
                txb_encode(&mut lump);
            }

            HogRecord {
                name: write_name(&entry.name(), MAX_NAME_LENGTH),
                size: lump.len() as u32,
            }
            .write(&mut writer)?;
            writer.write_all(&lump)?;
        }

        for (entry, offset) in entries.iter().zip(offsets) {
            entry.set_offset_on_disk(offset);
            entry.set_size_on_disk(entry.size() as u32);
        }

        Ok(writer.into_inner())
    }

    fn rename_entry(&self, entry: &ArchiveEntry, name: &str) -> Result<()> {
        entry.rename(name)?;
        self.prepare_entry(entry);
        Ok(())
    }

    /// The TXB tag follows the entry name
    fn prepare_entry(&self, entry: &ArchiveEntry) {
        let encryption = match (is_txb_name(&entry.name()), entry.encryption()) {
            (true, _) => Encryption::Txb,
            (false, Encryption::Txb) => Encryption::None,
            (false, other) => other,
        };
        if encryption != entry.encryption() {
            debug!(entry = %entry.name(), %encryption, "updating encryption");
            entry.set_encryption(encryption);
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::format::FormatDescriptor;

    #[rustfmt::skip]
    const TEXT_AND_DATA: [u8; 41] = [
        b'D', b'H', b'F',
        // BRIEF.TXB, 2 bytes of TXB encoded "A\n"
        b'B', b'R', b'I', b'E', b'F', b'.', b'T', b'X', b'B', 0, 0, 0, 0,
        0x02, 0x00, 0x00, 0x00,
        0xB9, 0x0A,
        // LEVEL.RDL, 2 bytes
        b'L', b'E', b'V', b'E', b'L', b'.', b'R', b'D', b'L', 0, 0, 0, 0,
        0x02, 0x00, 0x00, 0x00,
        0x01, 0x02,
    ];

    fn open(data: &[u8]) -> Result<ArchiveDir> {
        let descriptor = FormatDescriptor::builtin_unknown();
        HogHandler.open(data, &mut OpenContext::new(&descriptor, None))
    }

    #[test]
    fn decodes_text_lumps() {
        let root = open(&TEXT_AND_DATA).unwrap();

        let brief = root.entry("BRIEF.TXB").unwrap();
        assert_eq!(brief.encryption(), Encryption::Txb);
        assert_eq!(&*brief.data(), b"A\n");
        assert_eq!(brief.offset_on_disk(), 20);

        let level = root.entry("LEVEL.RDL").unwrap();
        assert_eq!(level.encryption(), Encryption::None);
        assert_eq!(&*level.data(), &[0x01u8, 0x02]);
    }

    #[test]
    fn write_reencodes() {
        let root = open(&TEXT_AND_DATA).unwrap();

        let written = HogHandler.write(&root).unwrap();

        assert_eq!(format!("{:02X?}", written), format!("{:02X?}", TEXT_AND_DATA));
    }

    #[test]
    fn truncated_header_is_invalid() {
        let data = &TEXT_AND_DATA[..30];

        assert!(!HogHandler.is_this_format(data));
        assert!(matches!(open(data), Err(Error::InvalidArchive(_))));
    }

    #[test]
    fn truncated_data_is_invalid() {
        let data = &TEXT_AND_DATA[..40];

        assert!(!HogHandler.is_this_format(data));
        assert!(open(data).is_err());
    }

    #[test]
    fn empty_hog_is_valid() {
        let root = open(b"DHF").unwrap();
        assert!(root.is_empty());
    }

    #[test]
    fn rename_follows_extension() {
        let entry = ArchiveEntry::with_data("NOTES.TXT", b"hi".to_vec());

        HogHandler.rename_entry(&entry, "NOTES.TXB").unwrap();
        assert_eq!(entry.encryption(), Encryption::Txb);

        HogHandler.rename_entry(&entry, "NOTES.CTB").unwrap();
        assert_eq!(entry.encryption(), Encryption::Txb);

        HogHandler.rename_entry(&entry, "NOTES.TXT").unwrap();
        assert_eq!(entry.encryption(), Encryption::None);
    }
}
