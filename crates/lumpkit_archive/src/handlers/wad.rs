//! Doom engine WAD archives.
//!
//! A 12 byte header (`IWAD` or `PWAD`, u32 lump count, u32 directory offset) and a
//! directory of 16 byte records (u32 offset, u32 size, name\[8\]). Names are not
//! necessarily NUL terminated and may repeat, marker lumps are empty.

use std::io::{Cursor, Write};

use binrw::{BinRead, BinResult, BinWrite};
use tracing::{debug, instrument};

use super::{
    check_name, fits, flat_entries, loaded_entry, read_name, reject, to_u32, write_name,
    FormatHandler, OpenContext,
};
use crate::{
    dir::ArchiveDir,
    error::{Error, Result},
    format::ArchiveFormat,
};

/// WAD file header
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct WadHeader {
    /// `IWAD` or `PWAD`
    pub kind: [u8; 4],

    /// Number of directory records
    pub num_lumps: u32,

    /// Offset from the start of the file to the directory
    pub dir_offset: u32,
}

/// WAD directory record
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct WadRecord {
    /// Offset from the start of the file to the lump data
    pub offset: u32,

    /// Size of the lump data
    pub size: u32,

    /// Name, NUL padded when shorter than eight characters
    pub name: [u8; 8],
}

const IWAD: &[u8; 4] = b"IWAD";
const PWAD: &[u8; 4] = b"PWAD";
const HEADER_SIZE: usize = 12;
const RECORD_SIZE: usize = 16;
const MAX_NAME_LENGTH: usize = 8;

/// Handler for WAD archives
///
/// Remembers whether the last archive it opened was an IWAD so saving keeps the kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct WadHandler {
    iwad: bool,
}

impl WadHandler {
    /// Whether the archive was opened from an IWAD
    pub fn is_iwad(&self) -> bool {
        self.iwad
    }

    /// Parse and bounds check the header and directory of `data`
    fn read_directory(data: &[u8]) -> Result<(WadHeader, Vec<WadRecord>)> {
        if data.len() < HEADER_SIZE {
            return Err(Error::invalid("file is too small for a WAD header"));
        }

        let mut reader = Cursor::new(data);
        let header = WadHeader::read(&mut reader)?;
        if &header.kind != IWAD && &header.kind != PWAD {
            return Err(Error::invalid("missing IWAD/PWAD signature"));
        }

        let dir_offset = header.dir_offset as u64;
        let dir_size = header.num_lumps as u64 * RECORD_SIZE as u64;
        if !fits(dir_offset, dir_size, data.len()) {
            return Err(Error::invalid(format!(
                "directory of {} lumps runs past the end of the file",
                header.num_lumps
            )));
        }

        reader.set_position(dir_offset);
        let records = (0..header.num_lumps)
            .map(|_| WadRecord::read(&mut reader))
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
        // sprite lumps such as VILE\1 use a backslash
        for record in &records {
            check_name(&read_name(&record.name), &['/'])?;
        }

        Ok((header, records))
    }
}

impl FormatHandler for WadHandler {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Wad
    }

    fn is_this_format(&self, data: &[u8]) -> bool {
        Self::read_directory(data).is_ok()
    }

    #[instrument(skip_all, err, fields(size = data.len()))]
    fn open(&mut self, data: &[u8], ctx: &mut OpenContext<'_>) -> Result<ArchiveDir> {
        let (header, records) =
            Self::read_directory(data).map_err(|e| reject(self.format(), e))?;
        self.iwad = &header.kind == IWAD;
        debug!(iwad = self.iwad, lumps = records.len(), "reading directory");

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

        let mut offsets = Vec::with_capacity(entries.len());
        let mut position = HEADER_SIZE;
        for entry in &entries {
            offsets.push(to_u32(position)?);
            position += entry.size();
        }

        let mut writer = Cursor::new(Vec::with_capacity(position + entries.len() * RECORD_SIZE));
        WadHeader {
            kind: if self.iwad { *IWAD } else { *PWAD },
            num_lumps: to_u32(entries.len())?,
            dir_offset: to_u32(position)?,
        }
        .write(&mut writer)?;
        for entry in &entries {
            writer.write_all(&entry.data())?;
        }
        for (entry, offset) in entries.iter().zip(&offsets) {
            WadRecord {
                offset: *offset,
                size: entry.size() as u32,
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
