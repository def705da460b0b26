//! Quake PAK archives.
//!
//! A 12 byte header (`PACK`, u32 directory offset, u32 directory size) and a directory of
//! 64 byte records (path\[56\], u32 offset, u32 size). Paths use `/` separators and
//! subdirectories only exist implicitly through them.

use std::io::{Cursor, Write};

use binrw::{BinRead, BinResult, BinWrite};
use tracing::{instrument, warn};

use super::{
    check_name, fits, loaded_entry, read_name, reject, to_u32, write_name, FormatHandler,
    OpenContext,
};
use crate::{
    dir::ArchiveDir,
    error::{Error, Result},
    format::ArchiveFormat,
};

/// PAK file header
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(magic = b"PACK", little)]
pub struct PakHeader {
    /// Offset from the start of the file to the directory
    pub dir_offset: u32,

    /// Size of the directory in bytes
    pub dir_size: u32,
}

/// PAK directory record
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct PakRecord {
    /// NUL terminated path of the entry
    pub path: [u8; 56],

    /// Offset from the start of the file to the lump data
    pub offset: u32,

    /// Size of the lump data
    pub size: u32,
}

const HEADER_SIZE: usize = 12;
const RECORD_SIZE: usize = 64;
const MAX_PATH_LENGTH: usize = 55;

/// Handler for PAK archives
#[derive(Debug, Default, Clone, Copy)]
pub struct PakHandler;

impl PakHandler {
    /// Parse and bounds check the directory of `data`
    fn read_directory(data: &[u8]) -> Result<Vec<PakRecord>> {
        if data.len() < HEADER_SIZE {
            return Err(Error::invalid("file is too small for a PAK header"));
        }

        let mut reader = Cursor::new(data);
        let header =
            PakHeader::read(&mut reader).map_err(|_| Error::invalid("missing PACK signature"))?;

        if header.dir_size as usize % RECORD_SIZE != 0 {
            return Err(Error::invalid(format!(
                "directory size {} is not a multiple of {RECORD_SIZE}",
                header.dir_size
            )));
        }
        if !fits(header.dir_offset as u64, header.dir_size as u64, data.len()) {
            return Err(Error::invalid("directory runs past the end of the file"));
        }

        reader.set_position(header.dir_offset as u64);
        let records = (0..header.dir_size as usize / RECORD_SIZE)
            .map(|_| PakRecord::read(&mut reader))
            .collect::<BinResult<Vec<_>>>()?;

        for record in &records {
            let path = read_name(&record.path);
            if path.is_empty() || path.ends_with('/') {
                return Err(Error::invalid(format!("record path '{path}' has no file name")));
            }
            if path.split('/').any(str::is_empty) {
                return Err(Error::invalid(format!("record path '{path}' is not relative")));
            }
            for component in path.split('/') {
                check_name(component, &['\\'])?;
            }
            if !fits(record.offset as u64, record.size as u64, data.len()) {
                return Err(Error::invalid(format!(
                    "lump {path} runs past the end of the file"
                )));
            }
        }

        Ok(records)
    }
}

impl FormatHandler for PakHandler {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Pak
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
            let path = read_name(&record.path);
            let (dir, name) = match path.rsplit_once('/') {
                Some((dir_path, name)) => (root.get_or_create_subdir(dir_path).0, name),
                None => (root.clone(), path.as_str()),
            };

            let start = record.offset as usize;
            let end = start + record.size as usize;
            let entry = loaded_entry(
                name.to_owned(),
                data[start..end].to_vec(),
                record.offset,
                record.size,
            );
            dir.insert_entry(entry, None);
            ctx.report(i + 1, total);
        }

        Ok(root)
    }

    #[instrument(skip_all, err)]
    fn write(&self, root: &ArchiveDir) -> Result<Vec<u8>> {
        let entries = root.entry_tree_as_list(false);

        let mut offsets = Vec::with_capacity(entries.len());
        let mut position = HEADER_SIZE;
        for entry in &entries {
            let path = entry.path();
            if path.len() > MAX_PATH_LENGTH {
                warn!(%path, "entry path is too long for a PAK archive");
                return Err(Error::InvalidName(path));
            }
            offsets.push(to_u32(position)?);
            position += entry.size();
        }

        let mut writer = Cursor::new(Vec::with_capacity(position + entries.len() * RECORD_SIZE));
        PakHeader {
            dir_offset: to_u32(position)?,
            dir_size: to_u32(entries.len() * RECORD_SIZE)?,
        }
        .write(&mut writer)?;
        for entry in &entries {
            writer.write_all(&entry.data())?;
        }
        for (entry, offset) in entries.iter().zip(&offsets) {
            PakRecord {
                path: write_name(&entry.path(), MAX_PATH_LENGTH),
                offset: *offset,
                size: entry.size() as u32,
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

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{entry::ArchiveEntry, format::FormatDescriptor};

    fn open(data: &[u8]) -> Result<ArchiveDir> {
        let descriptor = FormatDescriptor::builtin_unknown();
        PakHandler.open(data, &mut OpenContext::new(&descriptor, None))
    }

    fn sample() -> ArchiveDir {
        let root = ArchiveDir::new_root(false);
        let (maps, _) = root.get_or_create_subdir("maps");
        maps.add_entry(ArchiveEntry::with_data("e1m1.bsp", b"bsp".to_vec()), None, false)
            .unwrap();
        let (sound, _) = root.get_or_create_subdir("sound/ambience");
        sound
            .add_entry(ArchiveEntry::with_data("wind2.wav", b"wav!".to_vec()), None, false)
            .unwrap();
        root.add_entry(ArchiveEntry::with_data("default.cfg", b"bind".to_vec()), None, false)
            .unwrap();
        root
    }

    #[test]
    fn paths_become_directories() {
        let written = PakHandler.write(&sample()).unwrap();
        assert!(PakHandler.is_this_format(&written));

        let root = open(&written).unwrap();

        assert_eq!(root.num_entries(true), 3);
        assert_eq!(
            &*root.dir_at_path("sound/ambience").unwrap().entry("wind2.wav").unwrap().data(),
            b"wav!"
        );
        assert_eq!(root.entry("default.cfg").unwrap().path(), "default.cfg");
        assert_eq!(
            root.dir_at_path("maps").unwrap().entry_at(0).unwrap().path(),
            "maps/e1m1.bsp"
        );
    }

    #[test]
    fn directory_is_written_after_data() {
        let written = PakHandler.write(&sample()).unwrap();

        let header = PakHeader::read(&mut Cursor::new(&written)).unwrap();
        assert_eq!(header.dir_offset as usize, HEADER_SIZE + 3 + 4 + 4);
        assert_eq!(header.dir_size as usize, 3 * RECORD_SIZE);
        assert_eq!(written.len(), HEADER_SIZE + 11 + 3 * RECORD_SIZE);
    }

    #[test]
    fn overlong_path_is_rejected() {
        let root = ArchiveDir::new_root(false);
        let (deep, _) = root.get_or_create_subdir(&"d/".repeat(30));
        deep.add_entry(ArchiveEntry::new("x"), None, false).unwrap();

        assert!(matches!(PakHandler.write(&root), Err(Error::InvalidName(_))));
    }

    #[test]
    fn ragged_directory_is_invalid() {
        let mut written = PakHandler.write(&sample()).unwrap();
        // dir_size - 1
        written[8] -= 1;

        assert!(!PakHandler.is_this_format(&written));
        assert!(open(&written).is_err());
    }

    fn with_path(path: &[u8; 13]) -> Vec<u8> {
        let mut written = PakHandler.write(&sample()).unwrap();
        let at = written
            .windows(13)
            .position(|w| w == b"maps/e1m1.bsp")
            .unwrap();
        written[at..at + 13].copy_from_slice(path);
        written
    }

    #[test]
    fn escaping_paths_are_invalid() {
        for path in [b"../../e1m.bsp", b"maps/../x.bsp", b"/etc/e1m1.bsp", b"maps\\e1m1.bsp"] {
            let written = with_path(path);

            assert!(!PakHandler.is_this_format(&written));
            assert!(matches!(open(&written), Err(Error::InvalidArchive(_))));
        }
    }

    #[test]
    fn dotted_names_are_kept() {
        let written = with_path(b"maps/..e1.bsp");

        let root = open(&written).unwrap();
        let maps = root.dir_at_path("maps").unwrap();
        assert_eq!(maps.entry("..e1.bsp").map(|e| e.path()), Some("maps/..e1.bsp".into()));
    }
}
