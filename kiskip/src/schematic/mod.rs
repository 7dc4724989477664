//! Schematic (`.kicad_sch`) layer on top of the generic document.
//!
//! The schematic dialect gives the root dedicated collections for symbols
//! (keyed by reference designator), wires, labels, global labels, text and
//! junctions. This module adds typed views over them and the operations that
//! only make sense on a sheet.

mod pin;
mod symbol;

pub use pin::SymbolPin;
pub use symbol::SymbolRef;

use std::path::Path;

use regex::Regex;

use crate::collection::{spatial, CollectionRef};
use crate::config::{DialectKind, LoadOptions};
use crate::document::{Document, NodeId};
use crate::error::{Result, SkipError};
use crate::geometry::Point;
use crate::parser::SExp;
use crate::templates::{template, TemplateKind};

const ROOT_TAG: &str = "kicad_sch";

/// Entity types the sheet-wide spatial queries look at.
const SEARCHABLE: [&str; 3] = ["symbol", "label", "global_label"];

/// A loaded schematic sheet.
#[derive(Debug)]
pub struct Schematic {
    doc: Document,
}

fn schematic_options() -> LoadOptions {
    LoadOptions {
        dialect: DialectKind::Schematic,
        ..LoadOptions::default()
    }
}

impl Schematic {
    pub fn load(path: &Path) -> Result<Self> {
        Self::checked(Document::load_with(path, schematic_options())?)
    }

    pub fn parse_str(text: &str) -> Result<Self> {
        Self::checked(Document::parse_str(text, schematic_options())?)
    }

    fn checked(doc: Document) -> Result<Self> {
        match doc.entity_type(doc.root()) {
            Some(ROOT_TAG) => Ok(Self { doc }),
            other => Err(SkipError::ValueShape(format!(
                "expected {} root, found {}",
                ROOT_TAG,
                other.unwrap_or("<untyped>")
            ))),
        }
    }

    pub fn from_document(doc: Document) -> Self {
        Self { doc }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        self.doc.write(path)
    }

    pub fn overwrite(&self) -> Result<()> {
        self.doc.overwrite()
    }

    pub fn reload(&mut self) -> Result<()> {
        self.doc.reload()
    }

    fn top_level(&self, entity_type: &str) -> Option<CollectionRef<'_>> {
        self.doc.collection_at(self.doc.root(), entity_type).ok()
    }

    fn top_level_ids(&self, entity_type: &str) -> Vec<NodeId> {
        self.doc.children_of_type(self.doc.root(), entity_type)
    }

    pub fn symbols(&self) -> Option<CollectionRef<'_>> {
        self.top_level("symbol")
    }

    pub fn wires(&self) -> Option<CollectionRef<'_>> {
        self.top_level("wire")
    }

    pub fn labels(&self) -> Option<CollectionRef<'_>> {
        self.top_level("label")
    }

    pub fn global_labels(&self) -> Option<CollectionRef<'_>> {
        self.top_level("global_label")
    }

    pub fn texts(&self) -> Option<CollectionRef<'_>> {
        self.top_level("text")
    }

    pub fn junctions(&self) -> Option<CollectionRef<'_>> {
        self.top_level("junction")
    }

    /// Look a symbol up by reference designator.
    pub fn symbol(&self, reference: &str) -> Result<SymbolRef<'_>> {
        let symbols = self.symbols().ok_or_else(|| SkipError::UnknownElement {
            collection: "symbol".to_string(),
            key: reference.to_string(),
        })?;
        let id = symbols.get_by_name(reference)?;
        Ok(SymbolRef::new(&self.doc, id))
    }

    pub fn symbol_refs(&self) -> Vec<SymbolRef<'_>> {
        self.top_level_ids("symbol")
            .into_iter()
            .map(|id| SymbolRef::new(&self.doc, id))
            .collect()
    }

    /// Library definition by library id (`Device:R`).
    pub fn lib_symbol(&self, lib_id: &str) -> Option<NodeId> {
        let lib_symbols = self.doc.child(self.doc.root(), "lib_symbols")?;
        self.doc
            .collection_at(lib_symbols, "symbol")
            .ok()?
            .get_by_name(lib_id)
            .ok()
    }

    fn filter_symbols<F>(&self, property: &str, keep: F) -> Vec<NodeId>
    where
        F: Fn(&str) -> bool,
    {
        self.symbol_refs()
            .into_iter()
            .filter(|s| s.property_value(property).map(|v| keep(&v)).unwrap_or(false))
            .map(|s| s.id())
            .collect()
    }

    /// Match at the start of the text, the way the pattern filters have
    /// always behaved.
    fn anchored(pattern: &str) -> Result<Regex> {
        Ok(Regex::new(&format!("^(?:{})", pattern))?)
    }

    pub fn reference_startswith(&self, prefix: &str) -> Vec<NodeId> {
        self.filter_symbols("Reference", |v| v.starts_with(prefix))
    }

    pub fn reference_matches(&self, pattern: &str) -> Result<Vec<NodeId>> {
        let re = Self::anchored(pattern)?;
        Ok(self.filter_symbols("Reference", |v| re.is_match(v)))
    }

    pub fn value_startswith(&self, prefix: &str) -> Vec<NodeId> {
        self.filter_symbols("Value", |v| v.starts_with(prefix))
    }

    pub fn value_matches(&self, pattern: &str) -> Result<Vec<NodeId>> {
        let re = Self::anchored(pattern)?;
        Ok(self.filter_symbols("Value", |v| re.is_match(v)))
    }

    /// Symbols, labels and global labels, in that order.
    pub fn searchable(&self) -> Vec<NodeId> {
        SEARCHABLE
            .iter()
            .flat_map(|ty| self.top_level_ids(ty))
            .collect()
    }

    pub fn within_circle(&self, cx: f64, cy: f64, radius: f64) -> Vec<NodeId> {
        spatial::within_circle(&self.doc, &self.searchable(), Point::new(cx, cy), radius)
    }

    pub fn within_rectangle(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> Vec<NodeId> {
        spatial::within_rectangle(&self.doc, &self.searchable(), x1, y1, x2, y2)
    }

    pub fn within_reach_of(&self, element: NodeId, distance: f64) -> Result<Vec<NodeId>> {
        spatial::within_reach_of(&self.doc, &self.searchable(), &element, distance)
    }

    pub fn between_elements(&self, a: NodeId, b: NodeId) -> Result<Vec<NodeId>> {
        spatial::between_elements(&self.doc, &self.searchable(), &a, &b)
    }

    /// Change a symbol property; editing `Reference` re-keys the symbol.
    pub fn set_property_value(&mut self, symbol: NodeId, name: &str, value: &str) -> Result<()> {
        let prop = self
            .doc
            .collection_at(symbol, "property")?
            .get_by_name(name)?;
        self.doc.set_scalar(prop, 1, SExp::string(value))
    }

    fn instantiate(&mut self, kind: TemplateKind) -> Result<NodeId> {
        let shape = template(kind)?;
        self.doc.new_from_template(&shape)
    }

    pub fn new_wire(&mut self, start: Point, end: Point) -> Result<NodeId> {
        let wire = self.instantiate(TemplateKind::Wire)?;
        let pts = self
            .doc
            .child(wire, "pts")
            .ok_or_else(|| SkipError::unknown_attribute(Some("wire"), "pts"))?;
        for (xy, p) in self.doc.children_of_type(pts, "xy").into_iter().zip([start, end]) {
            self.doc
                .set_value(xy, vec![SExp::Number(p.x), SExp::Number(p.y)])?;
        }
        Ok(wire)
    }

    fn new_placed(&mut self, kind: TemplateKind, text: Option<&str>, at: Point) -> Result<NodeId> {
        let id = self.instantiate(kind)?;
        if let Some(text) = text {
            self.doc.set_text(id, text)?;
        }
        self.doc.move_to(id, at.x, at.y, None)?;
        Ok(id)
    }

    pub fn new_label(&mut self, text: &str, at: Point) -> Result<NodeId> {
        self.new_placed(TemplateKind::Label, Some(text), at)
    }

    pub fn new_global_label(&mut self, text: &str, at: Point) -> Result<NodeId> {
        self.new_placed(TemplateKind::GlobalLabel, Some(text), at)
    }

    pub fn new_text(&mut self, text: &str, at: Point) -> Result<NodeId> {
        self.new_placed(TemplateKind::Text, Some(text), at)
    }

    pub fn new_junction(&mut self, at: Point) -> Result<NodeId> {
        self.new_placed(TemplateKind::Junction, None, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = r##"(kicad_sch (version 20231120) (generator "eeschema")
  (lib_symbols
    (symbol "Device:R" (in_bom yes) (on_board yes)
      (property "Reference" "R" (at 2.032 0 90))
      (symbol "R_1_1"
        (pin passive line (at 0 3.81 270) (length 1.27) (name "~") (number "1"))
        (pin passive line (at 0 -3.81 90) (length 1.27) (name "~") (number "2")))))
  (symbol (lib_id "Device:R") (at 100 50 0) (unit 1)
    (property "Reference" "R1" (at 102 49 0))
    (property "Value" "10k" (at 102 51 0))
    (pin "1" (uuid "p1")) (pin "2" (uuid "p2")))
  (symbol (lib_id "Device:R") (at 120 50 0) (unit 1)
    (property "Reference" "R12" (at 122 49 0))
    (property "Value" "4k7" (at 122 51 0))
    (pin "1" (uuid "p3")) (pin "2" (uuid "p4")))
  (symbol (lib_id "power:GND") (at 140 50 0) (unit 1)
    (property "Reference" "#PWR01" (at 140 52 0))
    (property "Value" "GND" (at 140 54 0)))
  (label "SDA" (at 100 40 0))
)"##;

    #[test]
    fn test_symbol_lookup() {
        let sch = Schematic::parse_str(SHEET).unwrap();
        assert_eq!(sch.symbols().unwrap().len(), 3);
        let r1 = sch.symbol("R1").unwrap();
        assert_eq!(r1.value().as_deref(), Some("10k"));
        assert!(sch.symbol("PWR01").unwrap().is_power());
        assert!(matches!(sch.symbol("R99"), Err(SkipError::UnknownElement { .. })));
        assert!(sch.lib_symbol("Device:R").is_some());
    }

    #[test]
    fn test_filters() {
        let sch = Schematic::parse_str(SHEET).unwrap();
        assert_eq!(sch.reference_startswith("R").len(), 2);
        assert_eq!(sch.reference_matches(r"R\d\d").unwrap().len(), 1);
        assert_eq!(sch.value_startswith("4k").len(), 1);
        assert_eq!(sch.value_matches("G").unwrap().len(), 1);
        assert!(matches!(sch.value_matches("("), Err(SkipError::Pattern(_))));
    }

    #[test]
    fn test_sheet_wide_queries() {
        let sch = Schematic::parse_str(SHEET).unwrap();
        let found = sch.within_circle(100.0, 45.0, 6.0);
        assert_eq!(found.len(), 2);
        assert_eq!(sch.within_rectangle(95.0, 35.0, 125.0, 55.0).len(), 3);
        let r1 = sch.symbol("R1").unwrap().id();
        let near = sch.within_reach_of(r1, 25.0).unwrap();
        assert!(!near.contains(&r1));
        assert_eq!(near.len(), 2);
    }

    #[test]
    fn test_new_elements() {
        let mut sch = Schematic::parse_str(SHEET).unwrap();
        let wire = sch
            .new_wire(Point::new(100.0, 40.0), Point::new(110.0, 40.0))
            .unwrap();
        assert_eq!(
            sch.document().points_of(wire),
            vec![Point::new(100.0, 40.0), Point::new(110.0, 40.0)]
        );
        let label = sch.new_label("SCL", Point::new(105.0, 40.0)).unwrap();
        assert_eq!(sch.document().text(label).as_deref(), Some("SCL"));
        assert_eq!(sch.labels().unwrap().len(), 2);

        let glabel = sch.new_global_label("VCC", Point::new(10.0, 10.0)).unwrap();
        let doc = sch.document();
        let refs = doc.property_node(glabel, "Intersheetrefs").unwrap();
        assert_eq!(doc.position(refs), Some(Point::new(3.7491, 10.0)));

        let junction = sch.new_junction(Point::new(110.0, 40.0)).unwrap();
        assert_eq!(sch.document().position(junction), Some(Point::new(110.0, 40.0)));
        let text = sch.new_text("note", Point::new(0.0, 0.0)).unwrap();
        assert_eq!(sch.texts().unwrap().get(0), Some(text));

        let wires = sch.wires().unwrap();
        assert_eq!(wires.list_labels(wire).len(), 2);
    }

    #[test]
    fn test_set_property_value_rekeys() {
        let mut sch = Schematic::parse_str(SHEET).unwrap();
        let r1 = sch.symbol("R1").unwrap().id();
        sch.set_property_value(r1, "Reference", "R2").unwrap();
        assert!(sch.symbol("R1").is_err());
        assert_eq!(sch.symbol("R2").unwrap().id(), r1);
        sch.set_property_value(r1, "value", "22k").unwrap();
        assert_eq!(sch.symbol("R2").unwrap().value().as_deref(), Some("22k"));
    }
}
