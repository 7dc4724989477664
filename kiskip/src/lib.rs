//! kiskip - load, query, edit and re-write KiCad S-expression files
//!
//! A file is parsed into a [`Document`]: an arena of typed nodes laid over
//! the raw S-expression tree. Reads come straight from the tree and writes
//! go straight back into it, so serializing a document never loses
//! entities the library does not understand.
//!
//! # Quick Start
//!
//! ```no_run
//! use kiskip::Schematic;
//! use std::path::Path;
//!
//! let mut sch = Schematic::load(Path::new("board.kicad_sch")).unwrap();
//! let r1 = sch.symbol("R1").unwrap().id();
//! sch.set_property_value(r1, "Value", "4k7").unwrap();
//! sch.document_mut().move_to(r1, 100.0, 50.0, Some(90)).unwrap();
//! sch.overwrite().unwrap();
//! ```
//!
//! # Features
//!
//! - **Round-trip**: parse, edit and write back without losing structure
//! - **Named collections**: `symbol["R1"]`-style lookup with sanitized keys
//! - **Geometry**: right-angle rotation, mirroring, radius and box queries
//! - **Connectivity**: wire networks, pin locations and attached labels

pub mod collection;
pub mod config;
pub mod document;
pub mod error;
pub mod geometry;
pub mod parser;
pub mod pcb;
pub mod schematic;
pub mod templates;

use std::path::Path;

// Re-export main types
pub use collection::{sanitize_key, Collection, CollectionRef};
pub use config::{DialectKind, LoadOptions, WriteOptions};
pub use document::{
    ChildGroup, ChildRef, CollectionId, Dialect, Document, EntityKind, Node, NodeId, NodeSummary,
    SkippedEntry, Value,
};
pub use error::{Result, SkipError};
pub use geometry::{AtValue, MirrorAxis, Point};
pub use parser::{ParseError, SExp};
pub use pcb::Pcb;
pub use schematic::{Schematic, SymbolPin, SymbolRef};
pub use templates::{template, TemplateKind};

/// Load any supported file, picking the dialect from its extension.
pub fn load(path: &Path) -> Result<Document> {
    Document::load_with(path, LoadOptions::for_path(path))
}

/// Load a schematic file (convenience wrapper).
pub fn load_schematic(path: &Path) -> Result<Schematic> {
    Schematic::load(path)
}

/// Load a PCB file (convenience wrapper).
pub fn load_pcb(path: &Path) -> Result<Pcb> {
    Pcb::load(path)
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::collection::spatial::Locate;
    pub use crate::{
        AtValue, Document, LoadOptions, NodeId, Pcb, Point, Schematic, SkipError, Value,
        WriteOptions,
    };
}
