use std::fmt;

use crate::collection::sanitize_key;
use crate::document::{Document, NodeId};
use crate::error::{Result, SkipError};
use crate::geometry::{AtValue, MirrorAxis, Point};

use super::pin::SymbolPin;

const POWER_PREFIX: &str = "power:";

/// A placed symbol instance on a sheet.
#[derive(Clone, Copy)]
pub struct SymbolRef<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl<'a> SymbolRef<'a> {
    pub(crate) fn new(doc: &'a Document, id: NodeId) -> Self {
        Self { doc, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    /// Property node by key, with the same lookup rules as any named
    /// collection.
    pub fn property(&self, name: &str) -> Result<NodeId> {
        match self.doc.collection_at(self.id, "property") {
            Ok(props) => props.get_by_name(name),
            Err(_) => self.doc.property_node(self.id, name).ok_or_else(|| {
                SkipError::UnknownElement {
                    collection: "property".to_string(),
                    key: name.to_string(),
                }
            }),
        }
    }

    pub fn property_value(&self, name: &str) -> Option<String> {
        let prop = self.property(name).ok()?;
        self.doc.scalar(prop, 1)?.as_text()
    }

    pub fn properties(&self) -> Vec<NodeId> {
        self.doc.children_of_type(self.id, "property")
    }

    pub fn reference(&self) -> Option<String> {
        self.property_value("Reference")
    }

    pub fn value(&self) -> Option<String> {
        self.property_value("Value")
    }

    pub fn lib_id(&self) -> Option<String> {
        let lib_id = self.doc.child(self.id, "lib_id")?;
        self.doc.text(lib_id)
    }

    pub fn is_power(&self) -> bool {
        self.lib_id()
            .map(|id| id.starts_with(POWER_PREFIX))
            .unwrap_or(false)
    }

    pub fn position(&self) -> Option<Point> {
        self.doc.position(self.id)
    }

    pub fn at(&self) -> Option<Result<AtValue>> {
        self.doc.at_value(self.id)
    }

    pub fn mirror(&self) -> Option<MirrorAxis> {
        let mirror = self.doc.child(self.id, "mirror")?;
        MirrorAxis::from_symbol(self.doc.scalar(mirror, 0)?.as_atom()?)
    }

    /// The library definition in the sheet's `lib_symbols`.
    pub fn lib_symbol(&self) -> Option<NodeId> {
        let lib_id = self.lib_id().filter(|id| !id.is_empty())?;
        let owner = self.doc.node(self.id).parent()?;
        let lib_symbols = self.doc.child(owner, "lib_symbols")?;
        self.doc
            .collection_at(lib_symbols, "symbol")
            .ok()?
            .get_by_name(&lib_id)
            .ok()
    }

    /// Instance pins, each matched with the library pin of the same number.
    pub fn pins(&self) -> Vec<SymbolPin<'a>> {
        let lib_pins: Vec<(String, NodeId)> = self
            .lib_symbol()
            .map(|lib| {
                self.doc
                    .find_all(lib, "pin")
                    .into_iter()
                    .filter_map(|p| {
                        let number = self.doc.child(p, "number")?;
                        Some((self.doc.text(number)?, p))
                    })
                    .collect()
            })
            .unwrap_or_default();

        self.doc
            .children_of_type(self.id, "pin")
            .into_iter()
            .map(|pin| {
                let number = self.doc.text(pin);
                let lib_pin = lib_pins
                    .iter()
                    .find(|(n, _)| Some(n) == number.as_ref())
                    .map(|(_, p)| *p);
                SymbolPin::new(self.doc, self.id, pin, lib_pin)
            })
            .collect()
    }

    /// Pin by key: the pin name, or its number for unnamed (`~`) pins.
    pub fn pin(&self, key: &str) -> Result<SymbolPin<'a>> {
        let pins = self.pins();
        let wanted = sanitize_key(key);
        pins.iter()
            .find(|p| p.key().as_deref() == Some(key))
            .or_else(|| {
                pins.iter()
                    .find(|p| p.key().map(|k| sanitize_key(&k)) == Some(wanted.clone()))
            })
            .cloned()
            .ok_or_else(|| SkipError::UnknownElement {
                collection: "pin".to_string(),
                key: key.to_string(),
            })
    }

    /// Every wire touching one of the symbol's pins.
    pub fn attached_wires(&self) -> Vec<NodeId> {
        let mut wires = Vec::new();
        for pin in self.pins() {
            for wire in pin.attached_wires() {
                if !wires.contains(&wire) {
                    wires.push(wire);
                }
            }
        }
        wires
    }
}

impl fmt::Debug for SymbolRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolRef")
            .field("id", &self.id)
            .field("reference", &self.reference())
            .field("lib_id", &self.lib_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::geometry::{MirrorAxis, Point};
    use crate::schematic::Schematic;

    const SHEET: &str = r#"(kicad_sch
  (lib_symbols
    (symbol "Device:R"
      (property "Reference" "R" (at 2.032 0 90))
      (symbol "R_1_1"
        (pin passive line (at 0 3.81 270) (length 1.27) (name "~") (number "1"))
        (pin passive line (at 0 -3.81 90) (length 1.27) (name "~") (number "2"))))
    (symbol "MCU:Chip"
      (symbol "Chip_1_1"
        (pin input line (at -5.08 2.54 0) (length 2.54) (name "SDA") (number "7")))))
  (symbol (lib_id "Device:R") (at 100 50 0) (unit 1)
    (property "Reference" "R1" (at 102 49 0))
    (property "Value" "10k" (at 102 51 0))
    (pin "1" (uuid "a")) (pin "2" (uuid "b")))
  (symbol (lib_id "Device:R") (at 60 20 90) (mirror x) (unit 1)
    (property "Reference" "R2" (at 62 19 0))
    (pin "1" (uuid "c")) (pin "2" (uuid "d")))
  (symbol (lib_id "MCU:Chip") (at 30 30 0) (unit 1)
    (property "Reference" "U1" (at 30 25 0))
    (pin "7" (uuid "e")) (pin "9" (uuid "f")))
  (wire (pts (xy 100 46.19) (xy 100 40)))
  (wire (pts (xy 100 53.81) (xy 100 60)))
  (wire (pts (xy 0 0) (xy 5 0)))
)"#;

    #[test]
    fn test_symbol_fields() {
        let sch = Schematic::parse_str(SHEET).unwrap();
        let r1 = sch.symbol("R1").unwrap();
        assert_eq!(r1.lib_id().as_deref(), Some("Device:R"));
        assert_eq!(r1.reference().as_deref(), Some("R1"));
        assert_eq!(r1.position(), Some(Point::new(100.0, 50.0)));
        assert_eq!(r1.properties().len(), 2);
        assert!(!r1.is_power());
        assert!(r1.mirror().is_none());
        assert_eq!(sch.symbol("R2").unwrap().mirror(), Some(MirrorAxis::X));
        assert_eq!(r1.lib_symbol(), sch.lib_symbol("Device:R"));
    }

    #[test]
    fn test_pins_keyed_by_number_or_name() {
        let sch = Schematic::parse_str(SHEET).unwrap();
        let r1 = sch.symbol("R1").unwrap();
        let keys: Vec<_> = r1.pins().iter().filter_map(|p| p.key()).collect();
        assert_eq!(keys, vec!["1", "2"]);

        let u1 = sch.symbol("U1").unwrap();
        let sda = u1.pin("SDA").unwrap();
        assert_eq!(sda.number().as_deref(), Some("7"));
        // No library pin for "9": it keeps its instance number.
        assert!(u1.pin("9").unwrap().lib_pin().is_none());
        assert!(u1.pin("SCL").is_err());
    }

    #[test]
    fn test_attached_wires() {
        let sch = Schematic::parse_str(SHEET).unwrap();
        let wires = sch.wires().unwrap();
        let r1 = sch.symbol("R1").unwrap();
        assert_eq!(
            r1.attached_wires(),
            vec![wires.get(0).unwrap(), wires.get(1).unwrap()]
        );
        assert!(sch.symbol("U1").unwrap().attached_wires().is_empty());
    }
}
