//! Classification of entry contents.
//!
//! Entries only hold a weak reference to their detected [`EntryType`]; the detector owns the
//! type descriptors and entries report no type once it is dropped.

use std::rc::Rc;

use crate::entry::ArchiveEntry;

/// A registered kind of entry content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryType {
    /// Short identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Extension used when exporting entries of this type
    pub extension: String,
}

impl EntryType {
    /// Build a type descriptor
    pub fn new(id: &str, name: &str, extension: &str) -> Self {
        EntryType {
            id: id.to_owned(),
            name: name.to_owned(),
            extension: extension.to_owned(),
        }
    }
}

/// Assigns an [`EntryType`] to entries
pub trait TypeDetector {
    /// Best matching type for `entry`, `None` leaves the entry untyped
    fn detect(&self, entry: &ArchiveEntry) -> Option<Rc<EntryType>>;

    /// Run detection over every entry of `entries`
    fn detect_all(&self, entries: &[ArchiveEntry]) -> usize {
        let mut detected = 0;
        for entry in entries {
            if let Some(entry_type) = self.detect(entry) {
                entry.set_detected_type(&entry_type);
                detected += 1;
            }
        }
        detected
    }
}

enum Rule {
    Empty,
    Magic(&'static [u8]),
    Riff(&'static [u8; 4]),
    Extension(&'static str),
    Text,
}

impl Rule {
    fn matches(&self, entry: &ArchiveEntry) -> bool {
        let data = entry.data();
        match self {
            Rule::Empty => data.is_empty(),
            Rule::Magic(magic) => data.starts_with(magic),
            Rule::Riff(kind) => {
                data.len() >= 12 && data.starts_with(b"RIFF") && data[8..12] == **kind
            }
            Rule::Extension(ext) => entry.extension().eq_ignore_ascii_case(ext),
            Rule::Text => {
                !data.is_empty()
                    && data
                        .iter()
                        .all(|b| b.is_ascii_graphic() || b.is_ascii_whitespace())
            }
        }
    }
}

/// Signature and extension based detector with a fixed rule set
///
/// Rules are tried in order, the first match wins and anything unmatched becomes `data`.
pub struct SignatureDetector {
    rules: Vec<(Rule, Rc<EntryType>)>,
    fallback: Rc<EntryType>,
}

impl Default for SignatureDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureDetector {
    /// Detector with the built-in rules
    pub fn new() -> Self {
        let rules = vec![
            (Rule::Empty, EntryType::new("marker", "Marker", "mrk")),
            (Rule::Magic(b"\x89PNG\r\n\x1a\n"), EntryType::new("png", "PNG", "png")),
            (Rule::Riff(b"WAVE"), EntryType::new("wav", "Wave Sound", "wav")),
            (Rule::Magic(b"MThd"), EntryType::new("midi", "MIDI", "mid")),
            (
                Rule::Magic(b"Creative Voice File"),
                EntryType::new("voc", "Creative Voice", "voc"),
            ),
            (Rule::Magic(b"BM \x1e"), EntryType::new("bm", "Dark Forces Bitmap", "bm")),
            (Rule::Extension("txb"), EntryType::new("txb", "Descent Text", "txb")),
            (Rule::Extension("ctb"), EntryType::new("txb", "Descent Text", "ctb")),
            (Rule::Text, EntryType::new("text", "Text", "txt")),
        ];

        SignatureDetector {
            rules: rules
                .into_iter()
                .map(|(rule, entry_type)| (rule, Rc::new(entry_type)))
                .collect(),
            fallback: Rc::new(EntryType::new("data", "Data", "dat")),
        }
    }

    /// Every type this detector can assign
    pub fn types(&self) -> impl Iterator<Item = &Rc<EntryType>> {
        self.rules
            .iter()
            .map(|(_, entry_type)| entry_type)
            .chain(std::iter::once(&self.fallback))
    }
}

impl TypeDetector for SignatureDetector {
    fn detect(&self, entry: &ArchiveEntry) -> Option<Rc<EntryType>> {
        let found = self
            .rules
            .iter()
            .find(|(rule, _)| rule.matches(entry))
            .map(|(_, entry_type)| entry_type)
            .unwrap_or(&self.fallback);
        Some(Rc::clone(found))
    }
}
