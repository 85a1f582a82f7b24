//! Coordinate tuple passed between pipeline steps.

use serde::{Deserialize, Serialize};

/// A 3D coordinate.
///
/// Depending on the stage of a pipeline this is (lon°, lat°, h m),
/// projected (easting m, northing m, h m) or geocentric (X, Y, Z m).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coord {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// A 2D coordinate at zero height.
    pub const fn xy(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Coordinate marking a point outside a step's domain.
    pub const fn invalid() -> Self {
        Self {
            x: f64::NAN,
            y: f64::NAN,
            z: f64::NAN,
        }
    }

    /// True when x and y are finite. Height is not checked; 2D steps
    /// pass it through untouched.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Replace non-finite results with [`Coord::invalid`].
    pub(crate) fn or_invalid(self) -> Self {
        if self.is_valid() && self.z.is_finite() {
            self
        } else {
            Self::invalid()
        }
    }
}
