use std::path::Path;

use lumpkit_archive::{Archive, ArchiveFormat, FormatRegistry};
use miette::{miette, Context, Result};

pub mod convert;
pub mod diff;
pub mod extract;
pub mod list;
pub mod merge;

#[derive(clap::Subcommand)]
pub enum ArchiveCommands {
    /// Compare the entries of two archives
    Diff(diff::DiffArgs),
    /// Re-save an archive in another format
    Convert(convert::ConvertArgs),
    /// Extract an archive into a directory
    Extract(extract::ExtractArgs),
    /// List the entries of an archive
    List(list::ListArgs),
    /// Merge a directory into a new archive
    Merge(merge::MergeArgs),
}

impl ArchiveCommands {
    pub fn handle(&self) -> Result<()> {
        match self {
            ArchiveCommands::Diff(diff) => diff.handle(),
            ArchiveCommands::Convert(convert) => convert.handle(),
            ArchiveCommands::Extract(extract) => extract.handle(),
            ArchiveCommands::List(list) => list.handle(),
            ArchiveCommands::Merge(merge) => merge.handle(),
        }
    }
}

/// Open the archive or folder at `path`, whatever its format
pub(crate) fn open(path: &Path) -> Result<Archive> {
    Archive::from_file(path).context(format!("path: {}", path.display()))
}

/// Empty archive of `format`, refusing formats that cannot be created
pub(crate) fn create(format: ArchiveFormat) -> Result<Archive> {
    let descriptor = FormatRegistry::global().descriptor(format);
    if !descriptor.create {
        return Err(miette!("{} archives cannot be created", descriptor.name));
    }
    Ok(Archive::new(format)?)
}

/// Copy everything in `source` into a new `format` archive and save it to `target`
pub(crate) fn repack(
    source: &Archive,
    format: ArchiveFormat,
    target: &Path,
    overwrite: bool,
) -> Result<Archive> {
    if !overwrite && target.exists() {
        return Err(miette!("{} already exists", target.display()));
    }

    let mut archive = create(format)?;
    archive
        .import_dir(source.root_dir(), None, None)
        .context(format!("copying entries into a {format} archive"))?;
    archive
        .save(target)
        .context(format!("creating {}", target.display()))?;
    Ok(archive)
}
