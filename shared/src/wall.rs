use crate::Vector2;
use serde::{Deserialize, Serialize};

/// A static line-segment obstacle. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl Wall {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn start(&self) -> Vector2 {
        Vector2::new(self.x1, self.y1)
    }

    pub fn end(&self) -> Vector2 {
        Vector2::new(self.x2, self.y2)
    }

    /// Direction of the wall from start to end, in degrees.
    pub fn angle(&self) -> f64 {
        (self.y2 - self.y1).atan2(self.x2 - self.x1).to_degrees()
    }

    pub fn length(&self) -> f64 {
        self.end().sub(&self.start()).magnitude()
    }

    /// Whether a body travelling from `from` to `to` crosses this wall.
    pub fn is_crossed_by(&self, from: Vector2, to: Vector2) -> bool {
        segments_intersect(from, to, self.start(), self.end()).is_some()
    }
}

/// Intersects segment `p1-p2` with segment `p3-p4`.
///
/// Returns the parameters `(t, u)` along each segment when the crossing lies on
/// both finite segments. Parallel and collinear segments never intersect.
pub fn segments_intersect(
    p1: Vector2,
    p2: Vector2,
    p3: Vector2,
    p4: Vector2,
) -> Option<(f64, f64)> {
    let den = (p1.x - p2.x) * (p3.y - p4.y) - (p1.y - p2.y) * (p3.x - p4.x);
    if den == 0.0 {
        return None;
    }

    let t = ((p1.x - p3.x) * (p3.y - p4.y) - (p1.y - p3.y) * (p3.x - p4.x)) / den;
    let u = -((p1.x - p2.x) * (p1.y - p3.y) - (p1.y - p2.y) * (p1.x - p3.x)) / den;

    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some((t, u))
    } else {
        None
    }
}
