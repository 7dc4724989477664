//! Wire networks and the labels that name them.
//!
//! Two wires are connected when an endpoint of one is bit-for-bit equal to
//! an endpoint of the other. Labels are looser: a label belongs to a wire
//! when it sits within [`LABEL_TOLERANCE`] of any of its segments.

use std::collections::{BTreeMap, HashSet};

use petgraph::graphmap::UnGraphMap;
use petgraph::visit::Dfs;

use crate::collection::CollectionRef;
use crate::document::{Document, NodeId};
use crate::geometry::{distance_to_segment, Point};

/// How close a label anchor must be to a wire, in file units.
pub const LABEL_TOLERANCE: f64 = 0.6;

fn endpoints(doc: &Document, wire: NodeId) -> Vec<Point> {
    let points = doc.points_of(wire);
    match points.as_slice() {
        [] => Vec::new(),
        [only] => vec![*only],
        [first, .., last] => vec![*first, *last],
    }
}

/// Every wire reachable from `start` through shared endpoints, `start`
/// included, in the order of `wires`. Cycles are visited once.
pub fn crawl_connected_wires(doc: &Document, wires: &[NodeId], start: NodeId) -> Vec<NodeId> {
    let mut all = wires.to_vec();
    if !all.contains(&start) {
        all.push(start);
    }

    let mut graph: UnGraphMap<NodeId, ()> = UnGraphMap::new();
    let mut by_point: BTreeMap<(u64, u64), Vec<NodeId>> = BTreeMap::new();
    for &wire in &all {
        graph.add_node(wire);
        for point in endpoints(doc, wire) {
            by_point.entry(point.exact_key()).or_default().push(wire);
        }
    }
    for members in by_point.values() {
        for other in members.iter().skip(1) {
            if *other != members[0] {
                graph.add_edge(members[0], *other, ());
            }
        }
    }

    let mut reached = HashSet::new();
    let mut dfs = Dfs::new(&graph, start);
    while let Some(wire) = dfs.next(&graph) {
        reached.insert(wire);
    }
    all.into_iter().filter(|w| reached.contains(w)).collect()
}

/// Wires with an endpoint exactly at `point`.
pub fn all_at(doc: &Document, wires: &[NodeId], point: Point) -> Vec<NodeId> {
    let key = point.exact_key();
    wires
        .iter()
        .copied()
        .filter(|w| endpoints(doc, *w).iter().any(|p| p.exact_key() == key))
        .collect()
}

/// Straight pieces of the wire; a single point is a degenerate piece.
fn segments(doc: &Document, wire: NodeId) -> Vec<(Point, Point)> {
    let points = doc.points_of(wire);
    match points.as_slice() {
        [] => Vec::new(),
        [only] => vec![(*only, *only)],
        _ => points.windows(2).map(|seg| (seg[0], seg[1])).collect(),
    }
}

/// Labels of `label_type` that sit on `wire`, or anywhere on its network
/// when `recursive`. Labels are looked up among the wire's siblings.
pub fn list_labels(doc: &Document, wire: NodeId, label_type: &str, recursive: bool) -> Vec<NodeId> {
    let Some(owner) = doc.node(wire).parent() else {
        return Vec::new();
    };
    let labels = doc.children_of_type(owner, label_type);
    if labels.is_empty() {
        return labels;
    }

    let network = if recursive {
        let wire_type = doc.entity_type(wire).unwrap_or("wire");
        let siblings = doc.children_of_type(owner, wire_type);
        crawl_connected_wires(doc, &siblings, wire)
    } else {
        vec![wire]
    };
    let pieces: Vec<(Point, Point)> = network.iter().flat_map(|w| segments(doc, *w)).collect();

    labels
        .into_iter()
        .filter(|label| {
            doc.position(*label)
                .map(|anchor| {
                    pieces
                        .iter()
                        .any(|(a, b)| distance_to_segment(&anchor, a, b) <= LABEL_TOLERANCE)
                })
                .unwrap_or(false)
        })
        .collect()
}

impl CollectionRef<'_> {
    pub fn crawl_connected_wires(&self, start: NodeId) -> Vec<NodeId> {
        crawl_connected_wires(self.document(), self.elements(), start)
    }

    pub fn all_at(&self, x: f64, y: f64) -> Vec<NodeId> {
        all_at(self.document(), self.elements(), Point::new(x, y))
    }

    pub fn list_labels(&self, wire: NodeId) -> Vec<NodeId> {
        list_labels(self.document(), wire, "label", false)
    }

    pub fn list_labels_recursive(&self, wire: NodeId) -> Vec<NodeId> {
        list_labels(self.document(), wire, "label", true)
    }

    pub fn list_global_labels(&self, wire: NodeId) -> Vec<NodeId> {
        list_labels(self.document(), wire, "global_label", false)
    }

    pub fn list_global_labels_recursive(&self, wire: NodeId) -> Vec<NodeId> {
        list_labels(self.document(), wire, "global_label", true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DialectKind, LoadOptions};

    fn schematic(text: &str) -> Document {
        let options = LoadOptions {
            dialect: DialectKind::Schematic,
            ..LoadOptions::default()
        };
        Document::parse_str(text, options).unwrap()
    }

    fn wire(x1: f64, y1: f64, x2: f64, y2: f64) -> String {
        format!("(wire (pts (xy {} {}) (xy {} {})))", x1, y1, x2, y2)
    }

    #[test]
    fn test_crawl_chain_excludes_isolated() {
        let text = format!(
            "(kicad_sch {} {} {} {})",
            wire(0.0, 0.0, 10.0, 0.0),
            wire(10.0, 0.0, 10.0, 10.0),
            wire(10.0, 10.0, 20.0, 10.0),
            wire(50.0, 50.0, 60.0, 50.0)
        );
        let doc = schematic(&text);
        let wires = doc.collection_at(doc.root(), "wire").unwrap();
        let ids: Vec<_> = wires.iter().collect();
        let found = wires.crawl_connected_wires(ids[0]);
        assert_eq!(found, vec![ids[0], ids[1], ids[2]]);
        assert_eq!(wires.crawl_connected_wires(ids[3]), vec![ids[3]]);
    }

    #[test]
    fn test_crawl_cycle_terminates() {
        let text = format!(
            "(kicad_sch {} {} {})",
            wire(0.0, 0.0, 10.0, 0.0),
            wire(10.0, 0.0, 5.0, 5.0),
            wire(5.0, 5.0, 0.0, 0.0)
        );
        let doc = schematic(&text);
        let wires = doc.collection_at(doc.root(), "wire").unwrap();
        let ids: Vec<_> = wires.iter().collect();
        assert_eq!(wires.crawl_connected_wires(ids[1]), ids);
    }

    #[test]
    fn test_crossing_without_shared_endpoint_is_not_connected() {
        let text = format!(
            "(kicad_sch {} {})",
            wire(0.0, 5.0, 10.0, 5.0),
            wire(5.0, 0.0, 5.0, 10.0)
        );
        let doc = schematic(&text);
        let wires = doc.collection_at(doc.root(), "wire").unwrap();
        let first = wires.get(0).unwrap();
        assert_eq!(wires.crawl_connected_wires(first), vec![first]);
    }

    #[test]
    fn test_all_at() {
        let text = format!(
            "(kicad_sch {} {})",
            wire(0.0, 0.0, 10.0, 0.0),
            wire(10.0, 0.0, 10.0, 10.0)
        );
        let doc = schematic(&text);
        let wires = doc.collection_at(doc.root(), "wire").unwrap();
        assert_eq!(wires.all_at(10.0, 0.0).len(), 2);
        assert_eq!(wires.all_at(0.0, 0.0).len(), 1);
        assert!(wires.all_at(5.0, 0.0).is_empty());
    }

    #[test]
    fn test_labels_on_wire_and_network() {
        let text = format!(
            "(kicad_sch {} {} {} \
               (label \"SDA\" (at 4.9 0.3 0)) \
               (label \"FAR\" (at 4.9 3 0)) \
               (global_label \"VCC\" (at 10 10 0)))",
            wire(0.0, 0.0, 10.0, 0.0),
            wire(10.0, 0.0, 10.0, 10.0),
            wire(40.0, 0.0, 50.0, 0.0)
        );
        let doc = schematic(&text);
        let root = doc.root();
        let wires = doc.collection_at(root, "wire").unwrap();
        let labels = doc.collection_at(root, "label").unwrap();
        let globals = doc.collection_at(root, "global_label").unwrap();
        let first = wires.get(0).unwrap();

        assert_eq!(wires.list_labels(first), vec![labels.get(0).unwrap()]);
        assert!(wires.list_global_labels(first).is_empty());
        assert_eq!(
            wires.list_global_labels_recursive(first),
            vec![globals.get(0).unwrap()]
        );
        assert!(wires.list_labels(wires.get(2).unwrap()).is_empty());
    }

    #[test]
    fn test_labels_on_very_long_and_zero_length_wires() {
        let text = format!(
            "(kicad_sch {} {} (label \"MID\" (at 500000000 0.4 0)) (label \"DOT\" (at 70.3 70 0)))",
            wire(0.0, 0.0, 1e9, 0.0),
            wire(70.0, 70.0, 70.0, 70.0)
        );
        let doc = schematic(&text);
        let root = doc.root();
        let wires = doc.collection_at(root, "wire").unwrap();
        let labels = doc.collection_at(root, "label").unwrap();
        assert_eq!(wires.list_labels(wires.get(0).unwrap()), vec![labels.get(0).unwrap()]);
        assert_eq!(wires.list_labels(wires.get(1).unwrap()), vec![labels.get(1).unwrap()]);
    }
}
