//! Board (`.kicad_pcb`) layer on top of the generic document.
//!
//! Key format details:
//! - All values are in millimeters
//! - Footprint children (pads, graphics) are positioned relative to the
//!   footprint, so moving a footprint only touches its own `at`
//! - Traces are stored as `(segment (start ..) (end ..) ..)` elements

use std::path::Path;

use tracing::debug;

use crate::collection::{spatial, CollectionRef};
use crate::config::{DialectKind, LoadOptions};
use crate::document::classify::footprint_reference;
use crate::document::{Document, NodeId};
use crate::error::{Result, SkipError};
use crate::geometry::Point;

const ROOT_TAG: &str = "kicad_pcb";

/// A loaded board.
#[derive(Debug)]
pub struct Pcb {
    doc: Document,
}

fn pcb_options() -> LoadOptions {
    LoadOptions {
        dialect: DialectKind::Pcb,
        ..LoadOptions::default()
    }
}

impl Pcb {
    pub fn load(path: &Path) -> Result<Self> {
        Self::checked(Document::load_with(path, pcb_options())?)
    }

    pub fn parse_str(text: &str) -> Result<Self> {
        Self::checked(Document::parse_str(text, pcb_options())?)
    }

    fn checked(doc: Document) -> Result<Self> {
        match doc.entity_type(doc.root()) {
            Some(ROOT_TAG) => {
                debug!(
                    footprints = doc.children_of_type(doc.root(), "footprint").len(),
                    segments = doc.children_of_type(doc.root(), "segment").len(),
                    "Loaded board"
                );
                Ok(Self { doc })
            }
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

    pub fn footprints(&self) -> Option<CollectionRef<'_>> {
        self.top_level("footprint")
    }

    pub fn segments(&self) -> Option<CollectionRef<'_>> {
        self.top_level("segment")
    }

    pub fn vias(&self) -> Option<CollectionRef<'_>> {
        self.top_level("via")
    }

    /// Footprint by reference designator.
    pub fn footprint(&self, reference: &str) -> Result<NodeId> {
        self.footprints()
            .ok_or_else(|| SkipError::UnknownElement {
                collection: "footprint".to_string(),
                key: reference.to_string(),
            })?
            .get_by_name(reference)
    }

    pub fn reference_of(&self, footprint: NodeId) -> Option<String> {
        footprint_reference(&self.doc, footprint)
    }

    /// Library name of a footprint (`Resistor_SMD:R_0603`).
    pub fn footprint_lib(&self, footprint: NodeId) -> Option<String> {
        self.doc.scalar(footprint, 0)?.as_text()
    }

    pub fn pads(&self, footprint: NodeId) -> Vec<NodeId> {
        self.doc.children_of_type(footprint, "pad")
    }

    /// Net declarations at board level, as `(number, name)`.
    pub fn nets(&self) -> Vec<(i64, String)> {
        self.doc
            .children_of_type(self.doc.root(), "net")
            .into_iter()
            .filter_map(|net| {
                let number = self.doc.scalar(net, 0)?.as_number()? as i64;
                let name = self.doc.scalar(net, 1)?.as_text()?;
                Some((number, name))
            })
            .collect()
    }

    /// Segments with an end inside the circle.
    pub fn segments_within_circle(&self, cx: f64, cy: f64, radius: f64) -> Vec<NodeId> {
        self.segments()
            .map(|s| s.within_circle(cx, cy, radius))
            .unwrap_or_default()
    }

    /// Footprints whose anchor lies inside the rectangle.
    pub fn footprints_within_rectangle(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> Vec<NodeId> {
        let footprints = self.doc.children_of_type(self.doc.root(), "footprint");
        spatial::within_rectangle(&self.doc, &footprints, x1, y1, x2, y2)
    }

    /// Segments with an end exactly on `point`.
    pub fn segments_at(&self, point: Point) -> Vec<NodeId> {
        self.segments().map(|s| s.all_at(point.x, point.y)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD: &str = r#"(kicad_pcb (version 20240108) (generator "pcbnew")
  (net 0 "")
  (net 1 "GND")
  (footprint "Resistor_SMD:R_0603" (layer "F.Cu") (at 10 10 90)
    (property "Reference" "R1" (at 0 -1.4 90) (layer "F.SilkS"))
    (property "Value" "10k" (at 0 1.4 90) (layer "F.Fab"))
    (pad "1" smd roundrect (at -0.8 0 90) (size 0.8 0.95) (layers "F.Cu") (net 1 "GND"))
    (pad "2" smd roundrect (at 0.8 0 90) (size 0.8 0.95) (layers "F.Cu")))
  (footprint "Capacitor_SMD:C_0603" (layer "F.Cu") (at 30 10)
    (fp_text reference "C1" (at 0 -1.4) (layer "F.SilkS"))
    (pad "1" smd roundrect (at -0.8 0) (size 0.8 0.95) (layers "F.Cu")))
  (segment (start 10 9.2) (end 20 9.2) (width 0.25) (layer "F.Cu") (net 1))
  (segment (start 20 9.2) (end 29.2 10) (width 0.25) (layer "F.Cu") (net 1))
  (via (at 20 9.2) (size 0.8) (drill 0.4) (layers "F.Cu" "B.Cu") (net 1))
)"#;

    #[test]
    fn test_footprints_by_reference() {
        let pcb = Pcb::parse_str(BOARD).unwrap();
        assert_eq!(pcb.footprints().unwrap().len(), 2);
        let r1 = pcb.footprint("R1").unwrap();
        assert_eq!(pcb.footprint_lib(r1).as_deref(), Some("Resistor_SMD:R_0603"));
        assert_eq!(pcb.pads(r1).len(), 2);
        let c1 = pcb.footprint("c1").unwrap();
        assert_eq!(pcb.reference_of(c1).as_deref(), Some("C1"));
        assert!(pcb.footprint("U1").is_err());
    }

    #[test]
    fn test_segments_and_vias() {
        let pcb = Pcb::parse_str(BOARD).unwrap();
        assert_eq!(pcb.segments().unwrap().len(), 2);
        assert_eq!(pcb.vias().unwrap().len(), 1);
        assert_eq!(pcb.segments_at(Point::new(20.0, 9.2)).len(), 2);
        assert_eq!(pcb.segments_within_circle(30.0, 10.0, 1.0).len(), 1);
        assert_eq!(pcb.footprints_within_rectangle(0.0, 0.0, 20.0, 20.0).len(), 1);
        assert_eq!(pcb.nets(), vec![(0, String::new()), (1, "GND".to_string())]);
    }

    #[test]
    fn test_moving_a_footprint_leaves_pads_relative() {
        let mut pcb = Pcb::parse_str(BOARD).unwrap();
        let r1 = pcb.footprint("R1").unwrap();
        let pad = pcb.pads(r1)[0];
        pcb.document_mut().move_to(r1, 15.0, 12.0, None).unwrap();
        let doc = pcb.document();
        assert_eq!(doc.position(r1), Some(Point::new(15.0, 12.0)));
        assert_eq!(doc.position(pad), Some(Point::new(-0.8, 0.0)));
    }

    #[test]
    fn test_rejects_other_roots() {
        assert!(matches!(
            Pcb::parse_str("(kicad_sch (version 1))"),
            Err(SkipError::ValueShape(_))
        ));
    }
}
