use clap::Args;
use miette::{miette, Context, IntoDiagnostic, Result};
use std::{
    fs::File,
    io::Write,
    path::{Component, Path, PathBuf},
};
use tracing::info;

#[derive(Args)]
pub struct ExtractArgs {
    /// An input archive file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

/// Where `entry_path` lands below `root`, refusing paths that would leave it
fn target_path(root: &Path, entry_path: &str) -> Result<PathBuf> {
    let mut target = root.to_path_buf();
    for part in entry_path.split('/') {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => target.push(name),
            _ => {
                return Err(miette!(
                    "refusing to extract {entry_path} outside {}",
                    root.display()
                ))
            }
        }
    }
    Ok(target)
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let archive = super::open(&self.file)?;

        for entry in archive.all_entries() {
            let p = target_path(&self.directory, &entry.path())?;
            info!("writing {}", p.display());

            let parent = p
                .parent()
                .ok_or(miette!("unable to find the parent of {}", p.display()))?;
            std::fs::create_dir_all(parent)
                .into_diagnostic()
                .context(format!("creating {}", parent.display()))?;

            let mut out = if !self.overwrite {
                File::create_new(&p)
                    .into_diagnostic()
                    .context(format!("creating {}", &p.display()))?
            } else {
                File::create(&p)
                    .into_diagnostic()
                    .context(format!("creating {}", &p.display()))?
            };

            out.write_all(&entry.data()).into_diagnostic()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn entries_land_below_the_target() {
        let root = Path::new("out");

        assert_eq!(
            target_path(root, "maps/e1m1.bsp").unwrap(),
            root.join("maps").join("e1m1.bsp")
        );
        assert_eq!(target_path(root, "VILE\\1").unwrap(), root.join("VILE\\1"));
    }

    #[test]
    fn escaping_entries_are_refused() {
        for path in ["../EVIL.TXT", "maps/../../x", "/etc/passwd", ".", ""] {
            assert!(target_path(Path::new("out"), path).is_err(), "{path}");
        }
    }
}
