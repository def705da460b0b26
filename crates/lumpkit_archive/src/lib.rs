//! This library reads, edits and writes the resource archives of classic PC games.
//!
//! # Model
//!
//! An [`Archive`] owns a tree of [`ArchiveDir`]s holding [`ArchiveEntry`]s. Entries are
//! shared handles: code holding one keeps it alive after it is removed from the archive,
//! at which point it reports [`EntryState::Deleted`]. Directories only keep weak links to
//! their parents.
//!
//! Every format is implemented by a [`handlers::FormatHandler`] that turns a byte buffer into
//! a fresh directory tree and back. A handler validates the whole structure before it creates
//! any entry, so a rejected file never leaves a partially populated archive behind.
//!
//! Static per-format capabilities ([`FormatDescriptor`]) come from a JSON document bundled
//! with the crate, see [`format`].
//!
//! # Supported formats
//!
//! | Format | Game                  | Header                          | Directory                                   | Save |
//! |--------|-----------------------|---------------------------------|---------------------------------------------|------|
//! | GOB    | Star Wars: Dark Forces| `GOB\x0A` + u32 dir offset      | u32 count + count × (offset, size, name\[13\]) | yes  |
//! | HOG    | Descent 1/2           | `DHF`                           | none, (name\[13\], size, data) stream          | yes  |
//! | LIB    | Shadowcaster          | none                            | footer, count × (size, offset, name\[13\]) + u16 count | yes |
//! | RFF    | Blood                 | `RFF\x1A` + version + dir + count | count × 48 byte records, encrypted ≥ 0x300 | no   |
//! | WAD    | Doom engine           | `IWAD`/`PWAD` + count + dir     | count × (offset, size, name\[8\])              | yes  |
//! | PAK    | Quake                 | `PACK` + dir offset + dir size  | (size / 64) × (path\[56\], offset, size)       | yes  |
//! | Folder | any                   | a directory on disk             | the filesystem                              | yes  |
//!
//! All multi-byte integers are little-endian.
//!
//! # Encryption
//!
//! HOG entries named `*.txb`/`*.ctb` are stored with the TXB cipher, RFF entries flagged
//! `0x10` have their first 256 bytes xored with the Blood keystream. Both are undone on load
//! and reapplied on save, the in-memory data is always plain.

pub mod archive;
pub mod cipher;
pub mod detect;
pub mod dir;
pub mod entry;
pub mod error;
pub mod format;
pub mod handlers;
pub mod signal;

pub use archive::Archive;
pub use detect::{EntryType, SignatureDetector, TypeDetector};
pub use dir::{ArchiveDir, MergeOutcome};
pub use entry::{ArchiveEntry, Encryption, EntryState};
pub use format::{load_format_info, ArchiveFormat, FormatDescriptor, FormatRegistry};
pub use handlers::{detect_format, detect_format_file, handler_for, FormatHandler};
pub use signal::{ArchiveEvent, SignalBlocker};
