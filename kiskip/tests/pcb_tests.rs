//! Tests for the board layer

use kiskip::{load_pcb, Pcb, Point, SkipError};
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn board() -> Pcb {
    load_pcb(&fixture_path("board.kicad_pcb")).expect("Should load fixture")
}

#[test]
fn test_footprints_keyed_by_either_reference_style() {
    let pcb = board();
    let footprints = pcb.footprints().unwrap();
    assert_eq!(footprints.len(), 2);
    let names: Vec<_> = footprints.names().collect();
    assert_eq!(names, vec!["C1", "R1"]);

    let r1 = pcb.footprint("R1").unwrap();
    assert_eq!(
        pcb.footprint_lib(r1).as_deref(),
        Some("Resistor_SMD:R_0603_1608Metric")
    );
    assert_eq!(pcb.pads(r1).len(), 2);
    assert!(matches!(
        pcb.footprint("U7"),
        Err(SkipError::UnknownElement { .. })
    ));
}

#[test]
fn test_tracks() {
    let pcb = board();
    assert_eq!(pcb.segments().unwrap().len(), 3);
    assert_eq!(pcb.vias().unwrap().len(), 1);
    assert_eq!(pcb.segments_at(Point::new(120.0, 79.175)).len(), 2);

    let segments = pcb.segments().unwrap();
    let first = segments.get(0).unwrap();
    assert_eq!(
        segments.crawl_connected_wires(first),
        vec![first, segments.get(1).unwrap()]
    );
    assert_eq!(pcb.segments_within_circle(110.0, 85.0, 0.5).len(), 1);
    assert_eq!(pcb.nets().len(), 3);
}

#[test]
fn test_footprint_reference_rename() {
    let mut pcb = board();
    let c1 = pcb.footprint("C1").unwrap();
    let fp_text = pcb
        .document()
        .children_of_type(c1, "fp_text")
        .into_iter()
        .next()
        .unwrap();
    pcb.document_mut()
        .set_scalar(fp_text, 1, kiskip::SExp::string("C9"))
        .unwrap();
    assert_eq!(pcb.footprint("C9").unwrap(), c1);
    assert!(pcb.footprint("C1").is_err());
}

#[test]
fn test_schematic_file_is_not_a_board() {
    let err = Pcb::load(&fixture_path("simple.kicad_sch")).unwrap_err();
    assert!(matches!(err, SkipError::ValueShape(_)));
}
