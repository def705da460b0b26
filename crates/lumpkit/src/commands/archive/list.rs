use clap::Args;
use lumpkit_archive::Encryption;
use miette::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;

#[derive(Args)]
pub struct ListArgs {
    /// An input archive file or folder
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let archive = super::open(&self.file)?;

        println!(
            "{} {} ({} entries)",
            archive.descriptor().name.bold(),
            self.file.display(),
            archive.num_entries(true)
        );

        for (i, entry) in archive.all_entries().iter().enumerate() {
            let encryption = match entry.encryption() {
                Encryption::None => String::new(),
                other => format!(" [{other}]"),
            };
            println!(
                "{:>5}  {:<40} {:>10}  {:08x}{}",
                i,
                entry.path(),
                entry.size(),
                entry.crc32(),
                encryption.yellow()
            );
        }

        Ok(())
    }
}
