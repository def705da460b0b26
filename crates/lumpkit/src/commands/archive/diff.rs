use clap::{Args, ValueEnum};
use itertools::{EitherOrBoth, Itertools};
use lumpkit_archive::{Archive, ArchiveEntry};
use miette::Result;
use owo_colors::OwoColorize;
use similar::{ChangeTag, TextDiff};
use std::{fmt::Display, path::PathBuf};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Mode {
    /// Only list what changed
    #[default]
    Summary,
    /// Also show line diffs of changed text entries
    Full,
}

#[derive(Debug, PartialEq, Eq)]
enum Change {
    Added(String),
    Removed(String),
    Modified {
        path: String,
        sizes: (usize, usize),
        crcs: (u32, u32),
        context: Vec<String>,
    },
}

impl Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::Added(path) => writeln!(f, "✅ {}", path.green()),
            Change::Removed(path) => writeln!(f, "❌ {}", path.red()),
            Change::Modified {
                path,
                sizes,
                crcs,
                context,
            } => {
                writeln!(f, "🔃 {}", path.blue())?;
                if sizes.0 != sizes.1 {
                    writeln!(f, "  * size: {} vs {}", sizes.0.red(), sizes.1.green())?;
                }
                writeln!(
                    f,
                    "  * crc32: {} vs {}",
                    format!("{:08x}", crcs.0).red(),
                    format!("{:08x}", crcs.1).green()
                )?;
                if !context.is_empty() {
                    writeln!(f, "{}", context.iter().map(|l| format!("    {l}")).join("\n"))?;
                }
                Ok(())
            }
        }
    }
}

/// Changed lines of two text buffers, `None` when either side is not UTF-8
fn text_context(left: &[u8], right: &[u8]) -> Option<Vec<String>> {
    let left = std::str::from_utf8(left).ok()?;
    let right = std::str::from_utf8(right).ok()?;

    let lines = TextDiff::from_lines(left, right)
        .iter_all_changes()
        .filter_map(|change| match change.tag() {
            ChangeTag::Delete => Some(format!("- {}", change.value().trim_end()).red().to_string()),
            ChangeTag::Insert => {
                Some(format!("+ {}", change.value().trim_end()).green().to_string())
            }
            ChangeTag::Equal => None,
        })
        .collect();
    Some(lines)
}

fn compare_entries(left: &ArchiveEntry, right: &ArchiveEntry, mode: Mode) -> Option<Change> {
    let crcs = (left.crc32(), right.crc32());
    let sizes = (left.size(), right.size());
    if crcs.0 == crcs.1 && sizes.0 == sizes.1 {
        return None;
    }

    let context = match mode {
        Mode::Summary => Vec::new(),
        Mode::Full => text_context(&left.data(), &right.data()).unwrap_or_default(),
    };

    Some(Change::Modified {
        path: left.path(),
        sizes,
        crcs,
        context,
    })
}

/// Changes turning `left` into `right`, sorted by path
fn compare(left: &Archive, right: &Archive, mode: Mode) -> Vec<Change> {
    let by_path = |archive: &Archive| {
        archive
            .all_entries()
            .into_iter()
            .sorted_by_key(|entry| entry.path())
            .collect::<Vec<_>>()
    };

    by_path(left)
        .into_iter()
        .merge_join_by(by_path(right), |l, r| l.path().cmp(&r.path()))
        .filter_map(|pair| match pair {
            EitherOrBoth::Left(l) => Some(Change::Removed(l.path())),
            EitherOrBoth::Right(r) => Some(Change::Added(r.path())),
            EitherOrBoth::Both(l, r) => compare_entries(&l, &r, mode),
        })
        .collect()
}

#[derive(Args)]
pub struct DiffArgs {
    /// The original archive
    #[arg(short, long, value_name = "FILE")]
    old: PathBuf,

    /// The updated archive
    #[arg(short, long, value_name = "FILE")]
    new: PathBuf,

    /// Comparison mode
    #[arg(short, long, value_enum, default_value_t = Mode::Summary)]
    mode: Mode,
}

impl DiffArgs {
    pub fn handle(&self) -> Result<()> {
        let left = super::open(&self.old)?;
        let right = super::open(&self.new)?;

        if left.format() != right.format() {
            println!(
                "* format: {} vs {}",
                left.format().red(),
                right.format().green()
            );
        }

        for change in compare(&left, &right, self.mode) {
            print!("{change}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use lumpkit_archive::{ArchiveEntry, ArchiveFormat};
    use pretty_assertions::assert_eq;

    use super::*;

    fn gob(entries: &[(&str, &str)]) -> Archive {
        let mut archive = Archive::new(ArchiveFormat::Gob).unwrap();
        for (name, data) in entries {
            archive
                .add_entry(ArchiveEntry::with_data(*name, data.as_bytes()), None, None)
                .unwrap();
        }
        archive
    }

    #[test]
    fn entries_are_paired_by_path() {
        let left = gob(&[("KEEP.TXT", "same"), ("GONE.TXT", "x"), ("EDIT.TXT", "one\ntwo\n")]);
        let right = gob(&[("EDIT.TXT", "one\nthree\n"), ("KEEP.TXT", "same"), ("NEW.TXT", "y")]);

        let changes = compare(&left, &right, Mode::Summary);

        assert_eq!(changes.len(), 3);
        assert!(matches!(&changes[0], Change::Modified { path, sizes: (8, 10), .. } if path == "EDIT.TXT"));
        assert_eq!(changes[1], Change::Removed("GONE.TXT".into()));
        assert_eq!(changes[2], Change::Added("NEW.TXT".into()));
    }

    #[test]
    fn full_mode_shows_changed_lines() {
        let left = gob(&[("EDIT.TXT", "one\ntwo\n")]);
        let right = gob(&[("EDIT.TXT", "one\nthree\n")]);

        let changes = compare(&left, &right, Mode::Full);

        let Change::Modified { context, .. } = &changes[0] else {
            panic!("expected a modification, got {:?}", changes[0]);
        };
        assert_eq!(context.len(), 2);
        assert!(context[0].contains("- two"));
        assert!(context[1].contains("+ three"));
    }

    #[test]
    fn binary_entries_have_no_context() {
        assert_eq!(text_context(&[0xff, 0xfe], b"text"), None);
    }
}
