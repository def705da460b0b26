use clap::Args;
use lumpkit_archive::{Archive, ArchiveFormat};
use miette::{miette, Context, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct MergeArgs {
    /// An input directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// A target archive file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Format of the new archive (gob, hog, lib, wad, pak)
    #[arg(long, value_name = "ID")]
    format: ArchiveFormat,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl MergeArgs {
    pub fn handle(&self) -> Result<()> {
        info!("creating {}", &self.file.display());

        let mut folder = Archive::new(ArchiveFormat::Dir)?;
        folder
            .open_file(&self.directory)
            .context(format!("reading {}", self.directory.display()))?;

        if folder.num_entries(true) == 0 {
            return Err(miette!("directory is empty"));
        }

        let archive = super::repack(&folder, self.format, &self.file, self.overwrite)?;
        info!("merged {} entries", archive.num_entries(true));

        Ok(())
    }
}
