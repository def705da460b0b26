use clap::Args;
use lumpkit_archive::ArchiveFormat;
use miette::Result;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct ConvertArgs {
    /// An input archive file
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// A target archive file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Format of the new archive (gob, hog, lib, wad, pak, dir)
    #[arg(long, value_name = "ID")]
    format: ArchiveFormat,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ConvertArgs {
    pub fn handle(&self) -> Result<()> {
        let source = super::open(&self.input)?;
        info!(
            "converting {} from {} to {}",
            self.input.display(),
            source.format(),
            self.format
        );

        super::repack(&source, self.format, &self.output, self.overwrite)?;
        Ok(())
    }
}
