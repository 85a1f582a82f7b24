//! Spherical ("web") Mercator projection, EPSG:3857.
//!
//! Longitude/latitude are projected onto a sphere whose radius is the
//! semi-major axis of the datum ellipsoid, which is what tile servers use.

use super::Transform;
use crate::Coord;
use std::f64::consts::FRAC_PI_4;

/// Spherical Mercator parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct WebMercator {
    /// Sphere radius (meters)
    pub radius: f64,
    /// Central meridian (degrees)
    pub lon_0: f64,
    /// False easting (meters)
    pub x_0: f64,
    /// False northing (meters)
    pub y_0: f64,
}

impl Default for WebMercator {
    fn default() -> Self {
        Self {
            radius: crate::Ellipsoid::WGS84.a,
            lon_0: 0.0,
            x_0: 0.0,
            y_0: 0.0,
        }
    }
}

impl WebMercator {
    pub fn new(radius: f64, lon_0: f64, x_0: f64, y_0: f64) -> crate::Result<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(crate::ProjectionError::invalid(
                "webmerc",
                format!("radius must be positive, got {}", radius),
            ));
        }
        for (name, value) in [("lon_0", lon_0), ("x_0", x_0), ("y_0", y_0)] {
            if !value.is_finite() {
                return Err(crate::ProjectionError::invalid(
                    "webmerc",
                    format!("{} must be finite", name),
                ));
            }
        }
        Ok(Self {
            radius,
            lon_0,
            x_0,
            y_0,
        })
    }
}

impl Transform for WebMercator {
    fn name(&self) -> &'static str {
        "webmerc"
    }

    fn forward(&self, c: Coord) -> Coord {
        // Poles map to infinity.
        if c.y.abs() >= 90.0 {
            return Coord::invalid();
        }
        let lam = super::wrap_pi((c.x - self.lon_0).to_radians());
        let phi = c.y.to_radians();
        Coord::new(
            self.x_0 + self.radius * lam,
            self.y_0 + self.radius * (FRAC_PI_4 + phi / 2.0).tan().ln(),
            c.z,
        )
    }

    fn inverse(&self, c: Coord) -> Coord {
        let lam = (c.x - self.x_0) / self.radius;
        let phi = 2.0 * ((c.y - self.y_0) / self.radius).exp().atan() - std::f64::consts::FRAC_PI_2;
        Coord::new(lam.to_degrees() + self.lon_0, phi.to_degrees(), c.z)
    }

    fn proj_params(&self) -> Vec<String> {
        let mut params = vec![format!("R={}", self.radius)];
        for (name, value) in [("lon_0", self.lon_0), ("x_0", self.x_0), ("y_0", self.y_0)] {
            if value != 0.0 {
                params.push(format!("{}={}", name, value));
            }
        }
        params
    }
}
