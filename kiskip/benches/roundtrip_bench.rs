use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kiskip::prelude::*;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn bench_load_schematic(c: &mut Criterion) {
    let path = fixture_path("simple.kicad_sch");
    c.bench_function("load_schematic", |b| {
        b.iter(|| Schematic::load(black_box(&path)));
    });
}

fn bench_round_trip(c: &mut Criterion) {
    let text = std::fs::read_to_string(fixture_path("simple.kicad_sch")).unwrap();
    let options = WriteOptions::default();
    c.bench_function("parse_and_render", |b| {
        b.iter(|| {
            let doc = Document::parse_str(black_box(&text), LoadOptions::default()).unwrap();
            doc.to_text(&options)
        });
    });
}

fn bench_pin_network(c: &mut Criterion) {
    let sch = Schematic::load(&fixture_path("simple.kicad_sch")).unwrap();
    c.bench_function("pin_attached_labels", |b| {
        b.iter(|| {
            let r1 = sch.symbol(black_box("R1")).unwrap();
            r1.pins().iter().map(|p| p.attached_labels().len()).sum::<usize>()
        });
    });
}

criterion_group!(benches, bench_load_schematic, bench_round_trip, bench_pin_network);
criterion_main!(benches);
