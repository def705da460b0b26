//! Dark Forces GOB archives.
//!
//! | Offset        | Content                                         |
//! |---------------|-------------------------------------------------|
//! | 0             | `GOB\x0A`                                       |
//! | 4             | u32 directory offset                            |
//! | 8             | lump data                                       |
//! | dir           | u32 lump count                                  |
//! | dir + 4       | count × (u32 offset, u32 size, name\[13\])      |

use std::io::{Cursor, Write};

use binrw::{BinRead, BinResult, BinWrite};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::instrument;

use super::{
    check_name, fits, flat_entries, loaded_entry, read_name, reject, to_u32, write_name,
    FormatHandler, OpenContext, PATH_SEPARATORS,
};
use crate::{
    dir::ArchiveDir,
    error::{Error, Result},
    format::ArchiveFormat,
};

/// GOB file header
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(magic = b"GOB\x0a", little)]
pub struct GobHeader {
    /// Offset from the start of the file to the directory
    pub dir_offset: u32,
}

/// GOB directory record
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct GobRecord {
    /// Offset from the start of the file to the lump data
    pub offset: u32,

    /// Size of the lump data
    pub size: u32,

    /// NUL terminated name
    pub name: [u8; 13],
}

const HEADER_SIZE: usize = 8;
const RECORD_SIZE: usize = 21;
const MAX_NAME_LENGTH: usize = 12;

/// Handler for GOB archives
#[derive(Debug, Default, Clone, Copy)]
pub struct GobHandler;

impl GobHandler {
    /// Parse and bounds check the directory of `data`
    fn read_directory(data: &[u8]) -> Result<Vec<GobRecord>> {
        if data.len() < HEADER_SIZE {
            return Err(Error::invalid("file is too small for a GOB header"));
        }

        let mut reader = Cursor::new(data);
        let header =
            GobHeader::read(&mut reader).map_err(|_| Error::invalid("missing GOB signature"))?;

        let dir_offset = header.dir_offset as u64;
        if !fits(dir_offset, 4, data.len()) {
            return Err(Error::invalid(format!(
                "directory offset {dir_offset} is past the end of the file"
            )));
        }

        reader.set_position(dir_offset);
        let count = reader.read_u32::<LittleEndian>()? as u64;
        if !fits(dir_offset + 4, count * RECORD_SIZE as u64, data.len()) {
            return Err(Error::invalid(format!(
                "directory of {count} lumps runs past the end of the file"
            )));
        }

        let records = (0..count)
            .map(|_| GobRecord::read(&mut reader))
            .collect::<BinResult<Vec<_>>>()?;

        if let Some(bad) = records
            .iter()
            .find(|r| !fits(r.offset as u64, r.size as u64, data.len()))
        {
            return Err(Error::invalid(format!(
                "lump {} runs past the end of the file",
                read_name(&bad.name)
            )));
        }
        for record in &records {
            check_name(&read_name(&record.name), &PATH_SEPARATORS)?;
        }

        Ok(records)
    }
}

impl FormatHandler for GobHandler {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Gob
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

        // Lay everything out first so nothing is touched on failure
        let mut offsets = Vec::with_capacity(entries.len());
        let mut position = HEADER_SIZE;
        for entry in &entries {
            offsets.push(to_u32(position)?);
            position += entry.size();
        }
        let dir_offset = to_u32(position)?;
        let count = to_u32(entries.len())?;

        let mut writer = Cursor::new(Vec::with_capacity(
            position + 4 + entries.len() * RECORD_SIZE,
        ));
        GobHeader { dir_offset }.write(&mut writer)?;
        for entry in &entries {
            writer.write_all(&entry.data())?;
        }

        writer.write_u32::<LittleEndian>(count)?;
        for (entry, offset) in entries.iter().zip(&offsets) {
            GobRecord {
                offset: *offset,
                size: to_u32(entry.size())?,
                name: write_name(&entry.name(), MAX_NAME_LENGTH),
            }
            .write(&mut writer)?;
        }

        for (entry, offset) in entries.iter().zip(offsets) {
            entry.set_offset_on_disk(offset);
            entry.set_size_on_disk(entry.size() as u32);
        }

        Ok(writer.into_inner())
    }
}
