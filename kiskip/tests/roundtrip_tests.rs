//! Write-then-reload tests: edits must survive a trip through the file

use kiskip::parser::compact;
use kiskip::{load_schematic, Document, LoadOptions, Point, SExp, Schematic, WriteOptions};
use std::path::PathBuf;
use tempfile::tempdir;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn compacted(doc: &Document) -> SExp {
    let mut tree = doc.tree().clone();
    compact(&mut tree);
    tree
}

#[test]
fn test_unchanged_documents_round_trip() {
    let dir = tempdir().unwrap();
    for name in ["simple.kicad_sch", "board.kicad_pcb"] {
        let original = Document::load(&fixture_path(name)).unwrap();
        for (i, options) in [WriteOptions::default(), WriteOptions::compact()].iter().enumerate() {
            let out = dir.path().join(format!("{}.{}", i, name));
            original.write_with(&out, options).unwrap();
            let reloaded = Document::load(&out).unwrap();
            assert_eq!(compacted(&reloaded), compacted(&original), "{} / {}", name, i);
            assert_eq!(reloaded.len(), original.len());
        }
    }
}

#[test]
fn test_default_layout_breaks_lines_before_entities() {
    let doc = Document::load(&fixture_path("simple.kicad_sch")).unwrap();
    let text = doc.to_text(&WriteOptions::default());
    assert!(text.lines().any(|l| l.trim_start().starts_with("(symbol")));
    assert!(text.lines().any(|l| l.trim_start().starts_with("(wire")));

    let flat = doc.to_text(&WriteOptions::compact());
    assert_eq!(flat.trim_end().lines().count(), 1);
}

#[test]
fn test_edits_survive_reload() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("edited.kicad_sch");

    let mut sch = load_schematic(&fixture_path("simple.kicad_sch")).unwrap();
    let r1 = sch.symbol("R1").unwrap().id();
    sch.set_property_value(r1, "Value", "22k").unwrap();
    sch.set_property_value(r1, "Reference", "R5").unwrap();

    let c1 = sch.symbol("C1").unwrap().id();
    sch.document_mut().move_to(c1, 130.0, 50.0, Some(90)).unwrap();

    let isolated = sch.wires().unwrap().get(3).unwrap();
    sch.document_mut().delete(isolated).unwrap();
    sch.new_label("OUT", Point::new(120.0, 60.0)).unwrap();
    sch.write(&out).unwrap();

    let reloaded = Schematic::load(&out).unwrap();
    assert!(reloaded.symbol("R1").is_err());
    let r5 = reloaded.symbol("R5").unwrap();
    assert_eq!(r5.value().as_deref(), Some("22k"));

    let c1 = reloaded.symbol("C1").unwrap();
    let at = c1.at().unwrap().unwrap();
    assert_eq!((at.point(), at.rotation()), (Point::new(130.0, 50.0), 90));
    let reference = c1.property("Reference").unwrap();
    assert_eq!(
        reloaded.document().position(reference),
        Some(Point::new(133.81, 48.73))
    );

    assert_eq!(reloaded.wires().unwrap().len(), 6);
    let labels = reloaded.labels().unwrap();
    assert_eq!(labels.len(), 3);
    let out_label = labels.get(2).unwrap();
    assert_eq!(reloaded.document().text(out_label).as_deref(), Some("OUT"));
}

#[test]
fn test_new_elements_get_fresh_identity() {
    let mut sch = load_schematic(&fixture_path("simple.kicad_sch")).unwrap();
    let a = sch.new_junction(Point::new(110.0, 40.0)).unwrap();
    let b = sch.new_junction(Point::new(100.0, 40.0)).unwrap();
    let doc = sch.document();
    let uuid_of = |id| {
        doc.child(id, "uuid")
            .and_then(|u| doc.text(u))
            .unwrap_or_default()
    };
    assert_ne!(uuid_of(a), uuid_of(b));
    assert_eq!(uuid_of(a).len(), 36);
    assert_eq!(sch.junctions().unwrap().len(), 3);
}

#[test]
fn test_unparseable_entry_is_skipped_and_preserved() {
    let dir = tempdir().unwrap();
    let broken = dir.path().join("broken.kicad_sch");
    let text = std::fs::read_to_string(fixture_path("simple.kicad_sch"))
        .unwrap()
        .replace("(junction (at 100 60)", "(junction (at left 60)");
    std::fs::write(&broken, text).unwrap();

    let sch = Schematic::load(&broken).unwrap();
    let skipped = sch.document().skipped();
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].raw.contains("left"));
    assert!(sch.junctions().is_none());
    assert_eq!(sch.symbols().unwrap().len(), 3);

    let out = dir.path().join("rewritten.kicad_sch");
    sch.write(&out).unwrap();
    let written = std::fs::read_to_string(&out).unwrap();
    assert!(written.contains("(at left 60)"));
}

#[test]
fn test_overwrite_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sheet.kicad_sch");
    std::fs::copy(fixture_path("simple.kicad_sch"), &path).unwrap();

    let mut sch = Schematic::load(&path).unwrap();
    let text = sch.texts().unwrap().get(0).unwrap();
    sch.document_mut().set_text(text, "Input stage").unwrap();
    sch.overwrite().unwrap();

    let text = sch.texts().unwrap().get(0).unwrap();
    sch.document_mut().set_text(text, "discarded").unwrap();
    sch.reload().unwrap();
    let text = sch.texts().unwrap().get(0).unwrap();
    assert_eq!(sch.document().text(text).as_deref(), Some("Input stage"));
}

#[test]
fn test_generic_dialect_has_no_collections() {
    let doc = Document::load_with(&fixture_path("simple.kicad_sch"), LoadOptions::default()).unwrap();
    assert!(doc.collection_of(doc.root(), "wire").is_err());
    assert_eq!(doc.children_of_type(doc.root(), "wire").len(), 7);
}
