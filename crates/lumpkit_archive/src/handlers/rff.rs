//! Blood RFF archives.
//!
//! | Offset | Content                                                   |
//! |--------|-----------------------------------------------------------|
//! | 0      | `RFF\x1A`                                                 |
//! | 4      | u16 version, u16 reserved                                 |
//! | 8      | u32 directory offset                                      |
//! | 12     | u32 lump count                                            |
//! | dir    | count × 48 byte records, see [`RffRecord`]                |
//!
//! From version `0x300` on the directory is xored with the Blood keystream. Version `0x300`
//! keys it with the directory offset, later versions with the offset shifted left once.
//! Lumps flagged [`ENCRYPTED_FLAG`] have their first 256 bytes xored with key 0.
//!
//! Saving RFF archives is not supported.

use std::io::Cursor;

use binrw::{BinRead, BinResult, BinWrite};
use tracing::{debug, instrument, warn};

use super::{
    check_name, fits, loaded_entry, read_name, reject, FormatHandler, OpenContext, PATH_SEPARATORS,
};
use crate::{
    cipher::{blood_crypt, blood_crypt_entry},
    dir::ArchiveDir,
    entry::Encryption,
    error::{Error, Result},
    format::ArchiveFormat,
};

/// RFF file header
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(magic = b"RFF\x1a", little)]
pub struct RffHeader {
    /// Format version, `0x200`, `0x300` or `0x301`
    pub version: u16,

    /// Padding
    pub reserved: u16,

    /// Offset from the start of the file to the directory
    pub dir_offset: u32,

    /// Number of directory records
    pub num_lumps: u32,
}

/// RFF directory record
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct RffRecord {
    /// Unused by the game
    pub reserved: [u8; 16],

    /// Offset from the start of the file to the lump data
    pub offset: u32,

    /// Size of the lump data
    pub size: u32,

    /// Unused by the game
    pub packed_size: u32,

    /// Modification time as a DOS timestamp
    pub time: u32,

    /// Lump flags, see [`ENCRYPTED_FLAG`]
    pub flags: u8,

    /// Extension without the dot
    pub extension: [u8; 3],

    /// Name without the extension
    pub name: [u8; 8],

    /// Resource id
    pub index: u32,
}

const HEADER_SIZE: usize = 16;
const RECORD_SIZE: usize = 48;

/// Record flag marking a lump whose leading bytes are encrypted
pub const ENCRYPTED_FLAG: u8 = 0x10;

impl RffRecord {
    /// `NAME.EXT`, or just `NAME` when there is no extension
    pub fn full_name(&self) -> String {
        let name = read_name(&self.name);
        let extension = read_name(&self.extension);
        if extension.is_empty() {
            name
        } else {
            format!("{name}.{extension}")
        }
    }
}

/// Key the directory of an RFF file of `version` is encrypted with
pub fn directory_key(version: u16, dir_offset: u32) -> Option<u32> {
    match version {
        0x301.. => Some(dir_offset << 1),
        0x300 => Some(dir_offset),
        _ => None,
    }
}

/// Handler for RFF archives
#[derive(Debug, Default, Clone, Copy)]
pub struct RffHandler;

impl RffHandler {
    /// Parse, decrypt and bounds check the directory of `data`
    fn read_directory(data: &[u8]) -> Result<Vec<RffRecord>> {
        if data.len() < HEADER_SIZE {
            return Err(Error::invalid("file is too small for an RFF header"));
        }

        let header = RffHeader::read(&mut Cursor::new(data))
            .map_err(|_| Error::invalid("missing RFF signature"))?;

        let dir_offset = header.dir_offset as u64;
        let dir_size = header.num_lumps as u64 * RECORD_SIZE as u64;
        if !fits(dir_offset, dir_size, data.len()) {
            return Err(Error::invalid(format!(
                "directory of {} lumps runs past the end of the file",
                header.num_lumps
            )));
        }

        let start = dir_offset as usize;
        let mut directory = data[start..start + dir_size as usize].to_vec();
        if let Some(key) = directory_key(header.version, header.dir_offset) {
            debug!(version = header.version, key, "decrypting directory");
            blood_crypt(&mut directory, key);
        }

        let mut reader = Cursor::new(directory);
        let records = (0..header.num_lumps)
            .map(|_| RffRecord::read(&mut reader))
            .collect::<BinResult<Vec<_>>>()?;

        if let Some(bad) = records
            .iter()
            .find(|r| !fits(r.offset as u64, r.size as u64, data.len()))
        {
            return Err(Error::invalid(format!(
                "lump {} runs past the end of the file",
                bad.full_name()
            )));
        }
        for record in &records {
            check_name(&record.full_name(), &PATH_SEPARATORS)?;
        }

        Ok(records)
    }
}

impl FormatHandler for RffHandler {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Rff
    }

    fn is_this_format(&self, data: &[u8]) -> bool {
        Self::read_directory(data).is_ok()
    }

    #[instrument(skip_all, err, fields(size = data.len()))]
    fn open(&mut self, data: &[u8], ctx: &mut OpenContext<'_>) -> Result<ArchiveDir> {
        let records = Self::read_directory(data).map_err(|e| reject(self.format(), e))?;

        let root = ctx.new_root();
        let total = records.len();
        for (i, record) in records.iter().enumerate() {
            let start = record.offset as usize;
            let mut lump = data[start..start + record.size as usize].to_vec();
            let encrypted = record.flags & ENCRYPTED_FLAG != 0;
            if encrypted {
                blood_crypt_entry(&mut lump);
            }

            let entry = loaded_entry(record.full_name(), lump, record.offset, record.size);
            if encrypted {
                entry.set_encryption(Encryption::Blood);
            }
            root.insert_entry(entry, None);
            ctx.report(i + 1, total);
        }

        Ok(root)
    }

    fn write(&self, _root: &ArchiveDir) -> Result<Vec<u8>> {
        warn!("saving RFF archives is not supported");
        Err(Error::UnsupportedOperation {
            format: self.format(),
            operation: "saving",
        })
    }

    fn can_write(&self) -> bool {
        false
    }
}
