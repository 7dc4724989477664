//! Options for loading and writing documents.

use std::path::Path;

/// Which rule table classifies a document's entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialectKind {
    /// No dedicated collections: repeated children become plain sequences.
    #[default]
    Generic,
    /// `.kicad_sch` schematics.
    Schematic,
    /// `.kicad_pcb` layouts.
    Pcb,
}

impl DialectKind {
    /// Pick a dialect from a file extension, falling back to `Generic`.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("kicad_sch") => DialectKind::Schematic,
            Some("kicad_pcb") => DialectKind::Pcb,
            _ => DialectKind::Generic,
        }
    }
}

/// Options for parsing a document.
#[derive(Clone, Debug)]
pub struct LoadOptions {
    pub dialect: DialectKind,
    /// Nesting deeper than this fails the enclosing top-level entry.
    pub max_depth: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Generic,
            max_depth: 512,
        }
    }
}

impl LoadOptions {
    pub fn for_path(path: &Path) -> Self {
        Self {
            dialect: DialectKind::from_path(path),
            ..Self::default()
        }
    }
}

/// Layout policy for the writer. Purely cosmetic: none of these settings
/// change what a re-parse of the output sees.
#[derive(Clone, Debug)]
pub struct WriteOptions {
    /// Entities that always start on a new line.
    pub newline_before: Vec<String>,
    /// Entities whose over-long lines get wrapped at every space.
    pub bulk_keywords: Vec<String>,
    /// Soft limit, in characters, before bulk lines are wrapped.
    pub max_line_length: usize,
    /// Indent new lines by nesting depth.
    pub indent: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        let newline_before = [
            "property",
            "symbol",
            "wire",
            "data",
            "label",
            "global_label",
            "text",
            "junction",
            "polyline",
            "rectangle",
            "xy",
        ];
        Self {
            newline_before: newline_before.iter().map(|s| s.to_string()).collect(),
            bulk_keywords: vec!["data".to_string()],
            max_line_length: 255 * 3,
            indent: true,
        }
    }
}

impl WriteOptions {
    /// Everything on one line, no wrapping.
    pub fn compact() -> Self {
        Self {
            newline_before: Vec::new(),
            bulk_keywords: Vec::new(),
            max_line_length: usize::MAX,
            indent: false,
        }
    }
}
