//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in the units of its spatial reference.
///
/// For geographic references coordinates are degrees (lon, lat).
/// For projected references (EPSG:3857, EPSG:5514, ...) they are metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// An "inverted" box that any point extends. Used as the seed when
    /// accumulating a bounding box from samples.
    pub fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    /// True when all coordinates are finite and min <= max on both axes.
    pub fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Center point of the box.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Check if this bbox intersects another (touching edges do not count).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Compute the intersection of two bounding boxes.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grow the box to include a point. Non-finite points are ignored.
    pub fn extend(&mut self, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Expand the box by `buffer` units on every side.
    pub fn expand(&self, buffer: f64) -> Self {
        Self {
            min_x: self.min_x - buffer,
            min_y: self.min_y - buffer,
            max_x: self.max_x + buffer,
            max_y: self.max_y + buffer,
        }
    }

    /// Snap the box outward so every edge lies on an integer multiple of
    /// `resolution`.
    ///
    /// Returns the snapped box together with the integer cell indices
    /// `(ix_min, iy_min, ix_max, iy_max)` of its edges, so callers can derive
    /// pixel counts without re-dividing floating point extents.
    pub fn snap_outward(&self, resolution: f64) -> (BoundingBox, [i64; 4]) {
        let ix_min = snap_floor(self.min_x / resolution);
        let iy_min = snap_floor(self.min_y / resolution);
        let ix_max = snap_ceil(self.max_x / resolution);
        let iy_max = snap_ceil(self.max_y / resolution);

        let bbox = BoundingBox::new(
            ix_min as f64 * resolution,
            iy_min as f64 * resolution,
            ix_max as f64 * resolution,
            iy_max as f64 * resolution,
        );
        (bbox, [ix_min, iy_min, ix_max, iy_max])
    }
}

/// Tolerance, in cells, under which an edge is treated as already aligned.
/// Keeps `x/res` values such as `2.0000000000004` from growing a whole cell.
const SNAP_EPSILON: f64 = 1e-9;

fn snap_floor(v: f64) -> i64 {
    let r = v.round();
    if (v - r).abs() < SNAP_EPSILON {
        r as i64
    } else {
        v.floor() as i64
    }
}

fn snap_ceil(v: f64) -> i64 {
    let r = v.round();
    if (v - r).abs() < SNAP_EPSILON {
        r as i64
    } else {
        v.ceil() as i64
    }
}
