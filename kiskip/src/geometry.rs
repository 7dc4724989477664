//! Positions and right-angle rotations.
//!
//! KiCad places most things with `(at X Y [ANGLE])`. Schematic orientation is
//! restricted to the four right angles, so rotation is modelled as a value in
//! {0, 90, 180, 270} and every turn is a composition of 90 degree steps about
//! the element's own anchor.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SkipError};
use crate::parser::SExp;

/// A bare 2D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Bit-exact key for coincidence tests. `-0.0` and `0.0` map together.
    pub(crate) fn exact_key(&self) -> (u64, u64) {
        fn bits(v: f64) -> u64 {
            if v == 0.0 {
                0.0f64.to_bits()
            } else {
                v.to_bits()
            }
        }
        (bits(self.x), bits(self.y))
    }
}

/// Axis a placement can be mirrored about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MirrorAxis {
    X,
    Y,
}

impl MirrorAxis {
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "x" => Some(MirrorAxis::X),
            "y" => Some(MirrorAxis::Y),
            _ => None,
        }
    }
}

/// Position plus right-angle orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtValue {
    pub x: f64,
    pub y: f64,
    rotation: i64,
}

fn check_rotation(degrees: i64) -> Result<i64> {
    if degrees % 90 != 0 || !(0..=360).contains(&degrees) {
        return Err(SkipError::InvalidRotation(degrees));
    }
    Ok(degrees % 360)
}

/// Angles read from a file may be negative (`-90`); they are normalized into
/// [0, 360) before the right-angle check.
fn rotation_from_f64(r: f64) -> Result<i64> {
    if r.fract() != 0.0 {
        return Err(SkipError::InvalidRotation(r.trunc() as i64));
    }
    check_rotation((r as i64).rem_euclid(360))
}

impl AtValue {
    pub fn new(x: f64, y: f64, rotation: i64) -> Result<Self> {
        Ok(Self {
            x,
            y,
            rotation: check_rotation(rotation)?,
        })
    }

    /// Build from the body of an `(at X Y [ANGLE])` entity. A missing angle
    /// reads as 0.
    pub fn from_values(values: &[SExp]) -> Option<Result<Self>> {
        let x = values.first()?.as_number()?;
        let y = values.get(1)?.as_number()?;
        let rotation = match values.get(2).and_then(|r| r.as_number()) {
            Some(r) => match rotation_from_f64(r) {
                Ok(r) => r,
                Err(e) => return Some(Err(e)),
            },
            None => 0,
        };
        Some(Ok(Self { x, y, rotation }))
    }

    pub fn rotation(&self) -> i64 {
        self.rotation
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn set_rotation(&mut self, degrees: i64) -> Result<()> {
        self.rotation = check_rotation(degrees)?;
        Ok(())
    }

    /// Quarter turn about the local origin: `(x, y, r) -> (y, -x, r + 90)`.
    pub fn rotate90(&mut self) {
        let new_x = self.y;
        let new_y = -self.x;
        self.x = new_x;
        self.y = new_y;
        self.rotation = (self.rotation + 90) % 360;
    }

    /// Quarter-turn until the rotation equals `degrees`; returns the number of
    /// steps taken.
    pub fn rotate_to(&mut self, degrees: i64) -> Result<u32> {
        let target = check_rotation(degrees)?;
        let mut steps = 0;
        while self.rotation != target {
            self.rotate90();
            steps += 1;
        }
        Ok(steps)
    }

    /// Reflect a placement the way schematic files encode mirrored symbols.
    pub fn mirror(&mut self, axis: MirrorAxis) {
        match axis {
            MirrorAxis::Y => {
                self.x = -self.x;
                if self.rotation % 180 == 0 {
                    self.rotation = (self.rotation + 180) % 360;
                }
            }
            MirrorAxis::X => {
                self.y = -self.y;
                if self.rotation % 90 == 0 {
                    self.rotation = (self.rotation + 180) % 360;
                }
            }
        }
    }

    /// Values to write back into an `at` entity.
    pub fn to_values(&self, with_rotation: bool) -> Vec<SExp> {
        let mut values = vec![SExp::Number(self.x), SExp::Number(self.y)];
        if with_rotation {
            values.push(SExp::Number(self.rotation as f64));
        }
        values
    }
}

/// Round to `places` decimals, the precision positions are stored with.
pub fn round_to(v: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let rounded = (v * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Axis-aligned, inclusive rectangle containment with normalized corners.
pub fn in_rectangle(p: &Point, x1: f64, y1: f64, x2: f64, y2: f64) -> bool {
    let (min_x, max_x) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
    let (min_y, max_y) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
    p.x >= min_x && p.x <= max_x && p.y >= min_y && p.y <= max_y
}

/// Shortest distance from `p` to the segment `a`-`b`. NaN coordinates give
/// NaN, which compares false against any tolerance.
pub fn distance_to_segment(p: &Point, a: &Point, b: &Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / length_sq).clamp(0.0, 1.0);
    p.distance_to(&Point::new(a.x + t * dx, a.y + t * dy))
}
