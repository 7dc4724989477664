//! Radius and rectangle queries over positioned elements.
//!
//! An element takes part through every point it occupies: a symbol through
//! its `at` anchor, a wire through each of its points. A query matches when
//! any one of those points matches.

use crate::collection::CollectionRef;
use crate::document::{Document, NodeId};
use crate::error::{Result, SkipError};
use crate::geometry::{in_rectangle, Point};

/// Anything that occupies points on the sheet.
pub trait Locate {
    fn points(&self, doc: &Document) -> Vec<Point>;

    /// The point used when the element is the center of a query.
    fn anchor(&self, doc: &Document) -> Option<Point> {
        self.points(doc).first().copied()
    }
}

impl Locate for NodeId {
    fn points(&self, doc: &Document) -> Vec<Point> {
        doc.points_of(*self)
    }
}

impl Locate for Point {
    fn points(&self, _doc: &Document) -> Vec<Point> {
        vec![*self]
    }
}

fn no_position() -> SkipError {
    SkipError::UnknownAttribute {
        entity: "element".to_string(),
        attribute: "position".to_string(),
    }
}

/// Elements with a point at most `radius` away from `center`, in order.
pub fn within_circle<T: Locate + Clone>(
    doc: &Document,
    elements: &[T],
    center: Point,
    radius: f64,
) -> Vec<T> {
    elements
        .iter()
        .filter(|e| e.points(doc).iter().any(|p| p.distance_to(&center) <= radius))
        .cloned()
        .collect()
}

/// Elements with a point inside the rectangle spanned by two corners.
/// Bounds are inclusive and the corners may come in any order.
pub fn within_rectangle<T: Locate + Clone>(
    doc: &Document,
    elements: &[T],
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
) -> Vec<T> {
    elements
        .iter()
        .filter(|e| e.points(doc).iter().any(|p| in_rectangle(p, x1, y1, x2, y2)))
        .cloned()
        .collect()
}

/// Everything around `element`, the element itself excluded.
pub fn within_reach_of<T: Locate + Clone + PartialEq>(
    doc: &Document,
    elements: &[T],
    element: &T,
    distance: f64,
) -> Result<Vec<T>> {
    let center = element.anchor(doc).ok_or_else(no_position)?;
    let mut found = within_circle(doc, elements, center, distance);
    found.retain(|e| e != element);
    Ok(found)
}

/// Everything in the rectangle with `a` and `b` at opposite corners.
pub fn between_elements<T: Locate + Clone, A: Locate, B: Locate>(
    doc: &Document,
    elements: &[T],
    a: &A,
    b: &B,
) -> Result<Vec<T>> {
    let p1 = a.anchor(doc).ok_or_else(no_position)?;
    let p2 = b.anchor(doc).ok_or_else(no_position)?;
    Ok(within_rectangle(doc, elements, p1.x, p1.y, p2.x, p2.y))
}

impl CollectionRef<'_> {
    pub fn within_circle(&self, cx: f64, cy: f64, radius: f64) -> Vec<NodeId> {
        within_circle(self.document(), self.elements(), Point::new(cx, cy), radius)
    }

    pub fn within_rectangle(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> Vec<NodeId> {
        within_rectangle(self.document(), self.elements(), x1, y1, x2, y2)
    }

    pub fn within_reach_of(&self, element: NodeId, distance: f64) -> Result<Vec<NodeId>> {
        within_reach_of(self.document(), self.elements(), &element, distance)
    }

    pub fn between_elements(&self, a: NodeId, b: NodeId) -> Result<Vec<NodeId>> {
        between_elements(self.document(), self.elements(), &a, &b)
    }
}
