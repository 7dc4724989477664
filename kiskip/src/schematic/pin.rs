use std::fmt;

use crate::collection::connectivity::{all_at, list_labels};
use crate::collection::spatial::Locate;
use crate::document::{Document, NodeId};
use crate::error::{Result, SkipError};
use crate::geometry::{round_to, AtValue, MirrorAxis, Point};

/// Pin names in the library use `~` for "no name".
const UNNAMED_PIN: &str = "~";
const LOCATION_PLACES: i32 = 4;

/// An instance pin together with the library pin it was drawn from.
#[derive(Clone, Copy)]
pub struct SymbolPin<'a> {
    doc: &'a Document,
    symbol: NodeId,
    pin: NodeId,
    lib_pin: Option<NodeId>,
}

impl<'a> SymbolPin<'a> {
    pub(crate) fn new(doc: &'a Document, symbol: NodeId, pin: NodeId, lib_pin: Option<NodeId>) -> Self {
        Self {
            doc,
            symbol,
            pin,
            lib_pin,
        }
    }

    pub fn id(&self) -> NodeId {
        self.pin
    }

    pub fn symbol(&self) -> NodeId {
        self.symbol
    }

    pub fn lib_pin(&self) -> Option<NodeId> {
        self.lib_pin
    }

    fn lib_field(&self, field: &str) -> Option<String> {
        let node = self.doc.child(self.lib_pin?, field)?;
        self.doc.text(node)
    }

    /// Pin number from the library, or the instance's own number.
    pub fn number(&self) -> Option<String> {
        self.lib_field("number").or_else(|| self.doc.text(self.pin))
    }

    pub fn name(&self) -> Option<String> {
        self.lib_field("name")
    }

    pub fn key(&self) -> Option<String> {
        match self.name() {
            Some(name) if name != UNNAMED_PIN => Some(name),
            _ => self.number(),
        }
    }

    /// Where the pin ends up on the sheet.
    ///
    /// The library offset is turned with the symbol, then mirrored. Library
    /// Y grows upwards, so the offset is subtracted from the sheet Y.
    pub fn location(&self) -> Result<AtValue> {
        let lib_pin = self
            .lib_pin
            .ok_or_else(|| SkipError::unknown_attribute(Some("pin"), "lib_pin"))?;
        let placed = self
            .doc
            .at_value(self.symbol)
            .unwrap_or_else(|| Err(SkipError::unknown_attribute(Some("symbol"), "at")))?;
        let mut rel = self
            .doc
            .at_value(lib_pin)
            .unwrap_or_else(|| Err(SkipError::unknown_attribute(Some("pin"), "at")))?;

        for _ in 0..placed.rotation() / 90 {
            rel.rotate90();
        }
        if let Some(axis) = self.mirror() {
            rel.mirror(axis);
        }

        let origin = placed.point();
        let offset = rel.point();
        AtValue::new(
            round_to(origin.x + offset.x, LOCATION_PLACES),
            round_to(origin.y - offset.y, LOCATION_PLACES),
            rel.rotation(),
        )
    }

    fn mirror(&self) -> Option<MirrorAxis> {
        let mirror = self.doc.child(self.symbol, "mirror")?;
        MirrorAxis::from_symbol(self.doc.scalar(mirror, 0)?.as_atom()?)
    }

    /// Wires with an endpoint exactly on the pin.
    pub fn attached_wires(&self) -> Vec<NodeId> {
        let Ok(location) = self.location() else {
            return Vec::new();
        };
        let Some(sheet) = self.doc.node(self.symbol).parent() else {
            return Vec::new();
        };
        let wires = self.doc.children_of_type(sheet, "wire");
        all_at(self.doc, &wires, location.point())
    }

    fn labels_of_type(&self, label_type: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        for wire in self.attached_wires() {
            for label in list_labels(self.doc, wire, label_type, true) {
                if !found.contains(&label) {
                    found.push(label);
                }
            }
        }
        found
    }

    /// Local labels anywhere on the pin's wire network.
    pub fn attached_labels(&self) -> Vec<NodeId> {
        self.labels_of_type("label")
    }

    pub fn attached_global_labels(&self) -> Vec<NodeId> {
        self.labels_of_type("global_label")
    }
}

impl Locate for SymbolPin<'_> {
    fn points(&self, _doc: &Document) -> Vec<Point> {
        self.location().map(|at| vec![at.point()]).unwrap_or_default()
    }
}

impl PartialEq for SymbolPin<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.pin == other.pin
    }
}

impl fmt::Debug for SymbolPin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<SymbolPin {} \"{}\">",
            self.number().unwrap_or_default(),
            self.name().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::collection::spatial::within_circle;
    use crate::geometry::Point;
    use crate::schematic::Schematic;

    const SHEET: &str = r#"(kicad_sch
  (lib_symbols
    (symbol "Device:R"
      (symbol "R_1_1"
        (pin passive line (at 0 3.81 270) (length 1.27) (name "~") (number "1"))
        (pin passive line (at 0 -3.81 90) (length 1.27) (name "~") (number "2")))))
  (symbol (lib_id "Device:R") (at 100 50 0) (unit 1)
    (property "Reference" "R1" (at 102 49 0))
    (pin "1" (uuid "a")) (pin "2" (uuid "b")))
  (symbol (lib_id "Device:R") (at 60 20 90) (unit 1)
    (property "Reference" "R2" (at 62 19 0))
    (pin "1" (uuid "c")) (pin "2" (uuid "d")))
  (symbol (lib_id "Device:R") (at 60 80 90) (mirror x) (unit 1)
    (property "Reference" "R3" (at 62 79 0))
    (pin "1" (uuid "e")) (pin "2" (uuid "f")))
  (wire (pts (xy 100 46.19) (xy 100 40)))
  (wire (pts (xy 100 40) (xy 110 40)))
  (wire (pts (xy 110 40) (xy 110 30)))
  (label "VIN" (at 105 40 0))
  (global_label "VCC" (shape input) (at 110 30 0))
  (label "OTHER" (at 0 0 0))
)"#;

    #[test]
    fn test_location_unrotated() {
        let sch = Schematic::parse_str(SHEET).unwrap();
        let r1 = sch.symbol("R1").unwrap();
        let at = r1.pin("1").unwrap().location().unwrap();
        assert_eq!((at.point(), at.rotation()), (Point::new(100.0, 46.19), 270));
        let at = r1.pin("2").unwrap().location().unwrap();
        assert_eq!((at.point(), at.rotation()), (Point::new(100.0, 53.81), 90));
    }

    #[test]
    fn test_location_rotated_and_mirrored() {
        let sch = Schematic::parse_str(SHEET).unwrap();
        let at = sch.symbol("R2").unwrap().pin("1").unwrap().location().unwrap();
        assert_eq!((at.point(), at.rotation()), (Point::new(63.81, 20.0), 0));

        let at = sch.symbol("R3").unwrap().pin("1").unwrap().location().unwrap();
        assert_eq!((at.point(), at.rotation()), (Point::new(63.81, 80.0), 180));
    }

    #[test]
    fn test_attached_labels_follow_the_network() {
        let sch = Schematic::parse_str(SHEET).unwrap();
        let pin = sch.symbol("R1").unwrap().pin("1").unwrap();
        assert_eq!(pin.attached_wires().len(), 1);

        let labels = sch.labels().unwrap();
        assert_eq!(pin.attached_labels(), vec![labels.get(0).unwrap()]);
        let globals = sch.global_labels().unwrap();
        assert_eq!(pin.attached_global_labels(), vec![globals.get(0).unwrap()]);

        let other = sch.symbol("R1").unwrap().pin("2").unwrap();
        assert!(other.attached_wires().is_empty());
        assert!(other.attached_labels().is_empty());
    }

    #[test]
    fn test_pins_take_part_in_spatial_queries() {
        let sch = Schematic::parse_str(SHEET).unwrap();
        let pins = sch.symbol("R1").unwrap().pins();
        let near = within_circle(sch.document(), &pins, Point::new(100.0, 45.0), 2.0);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].number().as_deref(), Some("1"));
    }
}
