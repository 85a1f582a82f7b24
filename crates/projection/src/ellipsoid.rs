//! Reference ellipsoids.

use crate::error::{ProjectionError, Result};
use serde::{Deserialize, Serialize};

/// A reference ellipsoid given by its semi-major axis and flattening.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    /// Semi-major axis (meters)
    pub a: f64,
    /// Flattening
    pub f: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        a: 6_378_137.0,
        f: 1.0 / 298.257_223_563,
    };

    pub const GRS80: Ellipsoid = Ellipsoid {
        a: 6_378_137.0,
        f: 1.0 / 298.257_222_101,
    };

    /// Bessel 1841, used by S-JTSK and other central European datums.
    pub const BESSEL: Ellipsoid = Ellipsoid {
        a: 6_377_397.155,
        f: 1.0 / 299.152_812_8,
    };

    /// International 1924 (Hayford).
    pub const INTL: Ellipsoid = Ellipsoid {
        a: 6_378_388.0,
        f: 1.0 / 297.0,
    };

    /// Krassovsky 1940.
    pub const KRASS: Ellipsoid = Ellipsoid {
        a: 6_378_245.0,
        f: 1.0 / 298.3,
    };

    /// Build from semi-major axis and inverse flattening. `rf = 0` means a sphere.
    pub fn from_inverse_flattening(a: f64, rf: f64) -> Result<Self> {
        let f = if rf == 0.0 { 0.0 } else { 1.0 / rf };
        Self { a, f }.validated()
    }

    /// Build from both semi-axes.
    pub fn from_axes(a: f64, b: f64) -> Result<Self> {
        Self { a, f: (a - b) / a }.validated()
    }

    /// A sphere of the given radius.
    pub fn sphere(radius: f64) -> Result<Self> {
        Self { a: radius, f: 0.0 }.validated()
    }

    /// Look up an ellipsoid by its PROJ name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "wgs84" => Ok(Self::WGS84),
            "grs80" => Ok(Self::GRS80),
            "bessel" => Ok(Self::BESSEL),
            "intl" => Ok(Self::INTL),
            "krass" => Ok(Self::KRASS),
            _ => Err(ProjectionError::UnknownEllipsoid(name.to_string())),
        }
    }

    fn validated(self) -> Result<Self> {
        if !self.a.is_finite() || self.a <= 0.0 {
            return Err(ProjectionError::invalid(
                "ellipsoid",
                format!("semi-major axis must be positive, got {}", self.a),
            ));
        }
        if !self.f.is_finite() || !(0.0..1.0).contains(&self.f) {
            return Err(ProjectionError::invalid(
                "ellipsoid",
                format!("flattening must be in [0, 1), got {}", self.f),
            ));
        }
        Ok(self)
    }

    /// Semi-minor axis.
    pub fn b(&self) -> f64 {
        self.a * (1.0 - self.f)
    }

    /// First eccentricity squared.
    pub fn es(&self) -> f64 {
        self.f * (2.0 - self.f)
    }

    /// First eccentricity.
    pub fn e(&self) -> f64 {
        self.es().sqrt()
    }

    /// Second eccentricity squared.
    pub fn second_es(&self) -> f64 {
        let es = self.es();
        es / (1.0 - es)
    }

    /// Prime vertical radius of curvature at latitude `phi` (radians).
    pub fn prime_vertical_radius(&self, phi: f64) -> f64 {
        let s = phi.sin();
        self.a / (1.0 - self.es() * s * s).sqrt()
    }

    /// Meridional arc length from the equator to `phi` (radians).
    pub fn meridional_arc(&self, phi: f64) -> f64 {
        let e2 = self.es();
        let e4 = e2 * e2;
        let e6 = e4 * e2;

        self.a
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::WGS84
    }
}
