//! Static per-format metadata and the registry it is loaded into.
//!
//! Descriptors come from a JSON document mapping a format id to its capabilities:
//!
//! ```json
//! {
//!   "gob": {
//!     "name": "Dark Forces GOB",
//!     "supports_dirs": false,
//!     "names_extensions": true,
//!     "max_name_length": 12,
//!     "entry_format": "gob_entry",
//!     "prefer_uppercase": true,
//!     "create": true,
//!     "allow_duplicate_names": false,
//!     "extensions": [{ "extension": "gob", "name": "Dark Forces GOB" }]
//!   }
//! }
//! ```
//!
//! The `dir` and `unknown` descriptors are never read from configuration. They are
//! synthesized by the registry itself so lookups always have something to return.

use std::str::FromStr;
use std::sync::OnceLock;

use bon::Builder;
use derive_more::Display;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::Result;

/// Format configuration bundled with the library
pub const BUNDLED_FORMATS: &str = include_str!("../resources/formats.json");

/// Identifies an archive format
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArchiveFormat {
    /// A plain filesystem folder
    #[display("Folder")]
    Dir,

    /// Star Wars: Dark Forces
    #[display("GOB")]
    Gob,

    /// Descent 1/2
    #[display("HOG")]
    Hog,

    /// Shadowcaster
    #[display("LIB")]
    Lib,

    /// Blood
    #[display("RFF")]
    Rff,

    /// Doom engine
    #[display("WAD")]
    Wad,

    /// Quake
    #[display("PAK")]
    Pak,

    /// Fallback when nothing else matches
    #[display("Unknown")]
    Unknown,
}

impl ArchiveFormat {
    /// Every format, builtins included
    pub const ALL: [ArchiveFormat; 8] = [
        ArchiveFormat::Dir,
        ArchiveFormat::Gob,
        ArchiveFormat::Hog,
        ArchiveFormat::Lib,
        ArchiveFormat::Rff,
        ArchiveFormat::Wad,
        ArchiveFormat::Pak,
        ArchiveFormat::Unknown,
    ];

    /// The id used for this format in configuration
    pub const fn id(self) -> &'static str {
        match self {
            ArchiveFormat::Dir => "dir",
            ArchiveFormat::Gob => "gob",
            ArchiveFormat::Hog => "hog",
            ArchiveFormat::Lib => "lib",
            ArchiveFormat::Rff => "rff",
            ArchiveFormat::Wad => "wad",
            ArchiveFormat::Pak => "pak",
            ArchiveFormat::Unknown => "unknown",
        }
    }

    /// Look a format up by its configuration id (case-insensitive)
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.id().eq_ignore_ascii_case(id))
    }

    /// Whether the format is one of the two synthesized builtins
    pub const fn is_builtin(self) -> bool {
        matches!(self, ArchiveFormat::Dir | ArchiveFormat::Unknown)
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        ArchiveFormat::from_id(s).ok_or_else(|| format!("unknown archive format '{s}'"))
    }
}

/// A file extension associated with a format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatExtension {
    /// Extension without the leading dot
    pub extension: String,

    /// Human readable description of files with this extension
    pub name: String,
}

/// Immutable capabilities of an archive format
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct FormatDescriptor {
    /// The format being described
    pub format: ArchiveFormat,

    /// Display name
    #[builder(into)]
    pub name: String,

    /// Whether entries can live in subdirectories
    #[builder(default)]
    pub supports_dirs: bool,

    /// Whether entry names carry an extension
    #[builder(default = true)]
    pub names_extensions: bool,

    /// Longest allowed entry name, `None` when unbounded
    pub max_name_length: Option<usize>,

    /// Type id given to entries of this format before detection
    #[builder(into, default)]
    pub entry_format: String,

    /// Whether new names should be upper-cased
    #[builder(default)]
    pub prefer_uppercase: bool,

    /// Whether new archives of this format can be created
    #[builder(default)]
    pub create: bool,

    /// Whether a directory may hold several entries with the same name
    #[builder(default)]
    pub allow_duplicate_names: bool,

    /// Extensions commonly used by files of this format
    #[builder(default)]
    pub extensions: Vec<FormatExtension>,
}

impl FormatDescriptor {
    /// Descriptor for a plain folder treated as an archive
    pub fn builtin_dir() -> Self {
        FormatDescriptor::builder()
            .format(ArchiveFormat::Dir)
            .name("Folder")
            .supports_dirs(true)
            .create(true)
            .build()
    }

    /// Descriptor returned for anything the registry does not know
    pub fn builtin_unknown() -> Self {
        FormatDescriptor::builder()
            .format(ArchiveFormat::Unknown)
            .name("Unknown")
            .build()
    }

    /// Apply the format's naming conventions to `name`
    ///
    /// Upper-cases when the format prefers it and truncates to the maximum name length.
    pub fn normalise_name(&self, name: &str) -> String {
        let mut name = if self.prefer_uppercase {
            name.to_uppercase()
        } else {
            name.to_owned()
        };

        if let Some(max) = self.max_name_length {
            if let Some((cut, _)) = name.char_indices().nth(max) {
                name.truncate(cut);
            }
        }

        name
    }

    /// Whether `ext` is one of this format's extensions
    pub fn has_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        self.extensions
            .iter()
            .any(|e| e.extension.eq_ignore_ascii_case(ext))
    }
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    name: String,
    #[serde(default)]
    supports_dirs: bool,
    #[serde(default = "default_true")]
    names_extensions: bool,
    #[serde(default)]
    max_name_length: Option<i64>,
    #[serde(default)]
    entry_format: String,
    #[serde(default)]
    prefer_uppercase: bool,
    #[serde(default)]
    create: bool,
    #[serde(default)]
    allow_duplicate_names: bool,
    #[serde(default)]
    extensions: Vec<FormatExtension>,
}

fn default_true() -> bool {
    true
}

impl RawDescriptor {
    fn into_descriptor(self, format: ArchiveFormat) -> FormatDescriptor {
        FormatDescriptor {
            format,
            name: self.name,
            supports_dirs: self.supports_dirs,
            names_extensions: self.names_extensions,
            // Zero or negative lengths mean unbounded
            max_name_length: self
                .max_name_length
                .filter(|len| *len > 0)
                .map(|len| len as usize),
            entry_format: self.entry_format,
            prefer_uppercase: self.prefer_uppercase,
            create: self.create,
            allow_duplicate_names: self.allow_duplicate_names,
            extensions: self.extensions,
        }
    }
}

/// Lookup table from [`ArchiveFormat`] to its [`FormatDescriptor`]
///
/// Read-only once built. Tests construct isolated registries with [`FormatRegistry::from_json`],
/// everything else shares [`FormatRegistry::global`].
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: IndexMap<ArchiveFormat, FormatDescriptor>,
    unknown: FormatDescriptor,
}

static GLOBAL: OnceLock<FormatRegistry> = OnceLock::new();

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FormatRegistry {
    /// A registry holding only the synthesized `dir` and `unknown` descriptors
    pub fn builtin() -> Self {
        let mut registry = FormatRegistry {
            formats: IndexMap::new(),
            unknown: FormatDescriptor::builtin_unknown(),
        };
        registry.add_builtins();
        registry
    }

    /// Parse a format configuration document
    ///
    /// The document itself must be a JSON object. Entries with an unknown id or a malformed
    /// body are logged and skipped.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
            .inspect_err(|e| error!("format configuration is not a JSON object: {e}"))?;

        let mut formats = IndexMap::with_capacity(document.len() + 2);
        for (id, value) in document {
            let Some(format) = ArchiveFormat::from_id(&id).filter(|f| !f.is_builtin()) else {
                warn!("skipping unknown archive format id '{id}' in format configuration");
                continue;
            };

            match serde_json::from_value::<RawDescriptor>(value) {
                Ok(raw) => {
                    debug!("loaded format descriptor for {format}");
                    formats.insert(format, raw.into_descriptor(format));
                }
                Err(e) => warn!("skipping malformed descriptor for '{id}': {e}"),
            }
        }

        let mut registry = FormatRegistry {
            formats,
            unknown: FormatDescriptor::builtin_unknown(),
        };
        registry.add_builtins();
        Ok(registry)
    }

    /// The process-wide registry, built from [`BUNDLED_FORMATS`] on first use
    pub fn global() -> &'static FormatRegistry {
        GLOBAL.get_or_init(|| match FormatRegistry::from_json(BUNDLED_FORMATS) {
            Ok(registry) => registry,
            Err(e) => {
                error!("bundled format configuration is unreadable: {e}");
                FormatRegistry::builtin()
            }
        })
    }

    fn add_builtins(&mut self) {
        self.formats
            .insert(ArchiveFormat::Dir, FormatDescriptor::builtin_dir());
        self.formats
            .insert(ArchiveFormat::Unknown, self.unknown.clone());
    }

    /// Descriptor for `format`, or the `unknown` descriptor if it was never configured
    pub fn descriptor(&self, format: ArchiveFormat) -> &FormatDescriptor {
        self.formats.get(&format).unwrap_or(&self.unknown)
    }

    /// Descriptor for `format`, only if it was configured
    pub fn get(&self, format: ArchiveFormat) -> Option<&FormatDescriptor> {
        self.formats.get(&format)
    }

    /// Find the format owning file extension `ext`
    ///
    /// Descriptors are scanned in configuration order and the first match wins.
    pub fn format_from_extension(&self, ext: &str) -> ArchiveFormat {
        self.formats
            .values()
            .find(|descriptor| descriptor.has_extension(ext))
            .map(|descriptor| descriptor.format)
            .unwrap_or(ArchiveFormat::Unknown)
    }

    /// Number of descriptors, builtins included
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    /// Always false, the builtins are always present
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// Iterate over all descriptors in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &FormatDescriptor> {
        self.formats.values()
    }
}

/// Parse `json` into an isolated registry, see [`FormatRegistry::from_json`]
pub fn load_format_info(json: &str) -> Result<FormatRegistry> {
    FormatRegistry::from_json(json)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;

    #[test]
    fn bundled_configuration_loads() -> Result<()> {
        let registry = FormatRegistry::from_json(BUNDLED_FORMATS)?;

        for format in ArchiveFormat::ALL {
            assert_eq!(registry.descriptor(format).format, format);
        }
        assert_eq!(registry.len(), ArchiveFormat::ALL.len());

        let wad = registry.descriptor(ArchiveFormat::Wad);
        assert_eq!(wad.max_name_length, Some(8));
        assert!(wad.allow_duplicate_names);
        assert!(!wad.names_extensions);

        let rff = registry.descriptor(ArchiveFormat::Rff);
        assert!(!rff.create);

        Ok(())
    }

    #[traced_test]
    #[test]
    fn unknown_ids_are_skipped() -> Result<()> {
        let registry = FormatRegistry::from_json(
            r#"{
                "zip": { "name": "Zip" },
                "gob": { "name": "GOB", "max_name_length": 12 },
                "hog": { "supports_dirs": true }
            }"#,
        )?;

        assert!(registry.get(ArchiveFormat::Gob).is_some());
        assert!(registry.get(ArchiveFormat::Hog).is_none());
        assert!(registry.get(ArchiveFormat::Dir).is_some());
        assert!(registry.get(ArchiveFormat::Unknown).is_some());
        assert_eq!(registry.len(), 3);

        assert!(logs_contain("skipping unknown archive format id 'zip'"));
        assert!(logs_contain("skipping malformed descriptor for 'hog'"));

        Ok(())
    }

    #[test]
    fn builtins_cannot_be_overridden() -> Result<()> {
        let registry = FormatRegistry::from_json(
            r#"{ "dir": { "name": "Not a folder", "supports_dirs": false } }"#,
        )?;

        let dir = registry.descriptor(ArchiveFormat::Dir);
        assert_eq!(dir.name, "Folder");
        assert!(dir.supports_dirs);

        Ok(())
    }

    #[test]
    fn non_object_document_is_an_error() {
        assert!(FormatRegistry::from_json("[1, 2, 3]").is_err());
        assert!(load_format_info("not json").is_err());
    }

    #[test]
    fn extension_lookup_is_case_insensitive() -> Result<()> {
        let registry = FormatRegistry::from_json(BUNDLED_FORMATS)?;

        assert_eq!(registry.format_from_extension("GOB"), ArchiveFormat::Gob);
        assert_eq!(registry.format_from_extension(".sfx"), ArchiveFormat::Rff);
        assert_eq!(registry.format_from_extension("iwad"), ArchiveFormat::Wad);
        assert_eq!(registry.format_from_extension("zip"), ArchiveFormat::Unknown);

        Ok(())
    }

    #[test]
    fn extension_lookup_first_match_wins() -> Result<()> {
        let registry = FormatRegistry::from_json(
            r#"{
                "hog": { "name": "HOG", "extensions": [{ "extension": "dat", "name": "a" }] },
                "lib": { "name": "LIB", "extensions": [{ "extension": "dat", "name": "b" }] }
            }"#,
        )?;

        assert_eq!(registry.format_from_extension("dat"), ArchiveFormat::Hog);

        Ok(())
    }

    #[test]
    fn unconfigured_format_falls_back_to_unknown() {
        let registry = FormatRegistry::builtin();

        assert_eq!(
            registry.descriptor(ArchiveFormat::Gob).format,
            ArchiveFormat::Unknown
        );
        assert!(registry.get(ArchiveFormat::Gob).is_none());
    }

    #[test]
    fn negative_length_is_unbounded() -> Result<()> {
        let registry =
            FormatRegistry::from_json(r#"{ "pak": { "name": "PAK", "max_name_length": -1 } }"#)?;

        assert_eq!(registry.descriptor(ArchiveFormat::Pak).max_name_length, None);

        Ok(())
    }

    #[test]
    fn normalise_name_applies_case_and_length() {
        let descriptor = FormatDescriptor::builder()
            .format(ArchiveFormat::Wad)
            .name("WAD")
            .max_name_length(8)
            .prefer_uppercase(true)
            .build();

        assert_eq!(descriptor.normalise_name("e1m1"), "E1M1");
        assert_eq!(descriptor.normalise_name("longlumpname"), "LONGLUMP");
    }

    #[test]
    fn format_ids_round_trip() {
        for format in ArchiveFormat::ALL {
            assert_eq!(ArchiveFormat::from_id(format.id()), Some(format));
        }
        assert_eq!("RFF".parse::<ArchiveFormat>(), Ok(ArchiveFormat::Rff));
        assert!("zip".parse::<ArchiveFormat>().is_err());
    }
}
