//! A plain folder on disk treated as an archive.

use std::path::{Component, Path};

use tracing::{debug, instrument};
use walkdir::WalkDir;

use super::{loaded_entry, to_u32, FormatHandler, OpenContext};
use crate::{
    dir::ArchiveDir,
    error::{Error, Result},
    format::ArchiveFormat,
};

/// Handler for folders, which only work through paths
#[derive(Debug, Default, Clone, Copy)]
pub struct DirHandler;

/// `/` separated form of a relative path
fn archive_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `name` as a single path component, refusing anything that leaves the folder
fn component(name: &str) -> Result<&Path> {
    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(path),
        _ => Err(Error::InvalidName(name.to_owned())),
    }
}

impl DirHandler {
    fn write_dir(dir: &ArchiveDir, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        for entry in dir.entries() {
            let name = entry.name();
            std::fs::write(path.join(component(&name)?), &*entry.data())?;
            entry.set_size_on_disk(to_u32(entry.size())?);
        }
        for subdir in dir.subdirs() {
            let name = subdir.name();
            Self::write_dir(&subdir, &path.join(component(&name)?))?;
        }
        Ok(())
    }
}

impl FormatHandler for DirHandler {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Dir
    }

    fn is_this_format(&self, _data: &[u8]) -> bool {
        false
    }

    fn is_this_format_file(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn open(&mut self, _data: &[u8], _ctx: &mut OpenContext<'_>) -> Result<ArchiveDir> {
        Err(Error::UnsupportedOperation {
            format: self.format(),
            operation: "opening from memory",
        })
    }

    fn write(&self, _root: &ArchiveDir) -> Result<Vec<u8>> {
        Err(Error::UnsupportedOperation {
            format: self.format(),
            operation: "saving to memory",
        })
    }

    #[instrument(skip(self, ctx), err)]
    fn open_path(&mut self, path: &Path, ctx: &mut OpenContext<'_>) -> Result<ArchiveDir> {
        if !path.is_dir() {
            return Err(Error::invalid(format!("{} is not a folder", path.display())));
        }

        let items = WalkDir::new(path)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(std::io::Error::from)?;

        let root = ctx.new_root();
        let total = items.len();
        for (i, item) in items.iter().enumerate() {
            let relative = item.path().strip_prefix(path).unwrap_or(item.path());
            let relative_path = archive_path(relative);

            if item.file_type().is_dir() {
                root.get_or_create_subdir(&relative_path);
            } else if item.file_type().is_file() {
                let (dir_path, name) = relative_path
                    .rsplit_once('/')
                    .unwrap_or(("", relative_path.as_str()));
                let dir = root.get_or_create_subdir(dir_path).0;
                let data = std::fs::read(item.path())?;
                let size = to_u32(data.len())?;
                dir.insert_entry(loaded_entry(name.to_owned(), data, 0, size), None);
            } else {
                debug!(path = %item.path().display(), "skipping special file");
            }
            ctx.report(i + 1, total);
        }

        Ok(root)
    }

    #[instrument(skip(self, root), err)]
    fn write_path(&self, root: &ArchiveDir, path: &Path) -> Result<()> {
        Self::write_dir(root, path)
    }
}
