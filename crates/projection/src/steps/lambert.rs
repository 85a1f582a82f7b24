//! Lambert Conformal Conic projection on the ellipsoid.
//!
//! The cone is tangent (`lat_1 == lat_2`) or secant to the ellipsoid along
//! the standard parallels. Parameters:
//! - `lat_0`, `lon_0`: origin of the projected coordinates
//! - `lat_1`, `lat_2`: standard parallels
//! - `k_0`: scale factor applied on the standard parallels
//! - `x_0`, `y_0`: false easting/northing

use super::Transform;
use crate::{Coord, Ellipsoid, ProjectionError, Result};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

/// Iteration limit for the inverse latitude.
const MAX_ITERATIONS: usize = 15;

/// Convergence threshold for the inverse latitude (radians).
const LAT_TOLERANCE: f64 = 1e-12;

/// Lambert Conformal Conic projection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LambertConformal {
    pub ellipsoid: Ellipsoid,
    /// Latitude of origin (degrees)
    pub lat_0: f64,
    /// Central meridian (degrees)
    pub lon_0: f64,
    /// First standard parallel (degrees)
    pub lat_1: f64,
    /// Second standard parallel (degrees)
    pub lat_2: f64,
    pub k_0: f64,
    pub x_0: f64,
    pub y_0: f64,
    /// Cone constant
    n: f64,
    /// `a * k_0 * F`
    scale: f64,
    /// Rho at the latitude of origin
    rho0: f64,
}

impl LambertConformal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ellipsoid: Ellipsoid,
        lat_0: f64,
        lon_0: f64,
        lat_1: f64,
        lat_2: f64,
        k_0: f64,
        x_0: f64,
        y_0: f64,
    ) -> Result<Self> {
        for (name, v) in [("lat_0", lat_0), ("lat_1", lat_1), ("lat_2", lat_2)] {
            if !v.is_finite() || v.abs() > 90.0 {
                return Err(ProjectionError::invalid(
                    "lcc",
                    format!("{} out of range: {}", name, v),
                ));
            }
        }
        if lat_1.abs() == 90.0 || lat_2.abs() == 90.0 {
            return Err(ProjectionError::invalid(
                "lcc",
                "standard parallels cannot be at a pole",
            ));
        }
        if (lat_1 + lat_2).abs() < 1e-10 {
            return Err(ProjectionError::invalid(
                "lcc",
                "standard parallels cannot be symmetric about the equator",
            ));
        }
        if !k_0.is_finite() || k_0 <= 0.0 {
            return Err(ProjectionError::invalid(
                "lcc",
                format!("k_0 must be positive, got {}", k_0),
            ));
        }
        if !lon_0.is_finite() || !x_0.is_finite() || !y_0.is_finite() {
            return Err(ProjectionError::invalid(
                "lcc",
                "lon_0, x_0 and y_0 must be finite",
            ));
        }

        let e = ellipsoid.e();
        let phi1 = lat_1.to_radians();
        let phi2 = lat_2.to_radians();

        let m1 = msfn(phi1, e);
        let t1 = tsfn(phi1, e);
        let n = if (lat_1 - lat_2).abs() < 1e-10 {
            phi1.sin()
        } else {
            (m1.ln() - msfn(phi2, e).ln()) / (t1.ln() - tsfn(phi2, e).ln())
        };
        let f = m1 / (n * t1.powf(n));
        let scale = ellipsoid.a * k_0 * f;
        let rho0 = rho_at(scale, n, lat_0.to_radians(), e);

        if !n.is_finite() || !scale.is_finite() || !rho0.is_finite() {
            return Err(ProjectionError::invalid(
                "lcc",
                "degenerate cone for the given parallels",
            ));
        }

        Ok(Self {
            ellipsoid,
            lat_0,
            lon_0,
            lat_1,
            lat_2,
            k_0,
            x_0,
            y_0,
            n,
            scale,
            rho0,
        })
    }

    /// Cone constant `n`.
    pub fn cone_constant(&self) -> f64 {
        self.n
    }
}

/// `cos(phi) / sqrt(1 - e^2 sin^2(phi))`
fn msfn(phi: f64, e: f64) -> f64 {
    let s = e * phi.sin();
    phi.cos() / (1.0 - s * s).sqrt()
}

/// Isometric-latitude helper `t` (Snyder 15-9).
fn tsfn(phi: f64, e: f64) -> f64 {
    let s = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - s) / (1.0 + s)).powf(e / 2.0)
}

fn rho_at(scale: f64, n: f64, phi: f64, e: f64) -> f64 {
    if (phi.abs() - FRAC_PI_2).abs() < 1e-12 {
        // rho is 0 at the pole the cone opens towards, unbounded at the other
        return if phi * n > 0.0 { 0.0 } else { f64::INFINITY };
    }
    scale * tsfn(phi, e).powf(n)
}

impl Transform for LambertConformal {
    fn name(&self) -> &'static str {
        "lcc"
    }

    fn forward(&self, c: Coord) -> Coord {
        if c.y.abs() > 90.0 {
            return Coord::invalid();
        }
        let e = self.ellipsoid.e();
        let rho = rho_at(self.scale, self.n, c.y.to_radians(), e);
        if !rho.is_finite() {
            return Coord::invalid();
        }
        let theta = self.n * super::wrap_pi((c.x - self.lon_0).to_radians());

        Coord::new(
            self.x_0 + rho * theta.sin(),
            self.y_0 + self.rho0 - rho * theta.cos(),
            c.z,
        )
    }

    fn inverse(&self, c: Coord) -> Coord {
        let e = self.ellipsoid.e();
        let x = c.x - self.x_0;
        let dy = self.rho0 - (c.y - self.y_0);
        let sign = self.n.signum();

        let rho = sign * (x * x + dy * dy).sqrt();
        let theta = (sign * x).atan2(sign * dy);
        let lam = theta / self.n;

        if rho == 0.0 {
            return Coord::new(self.lon_0, sign * 90.0, c.z);
        }

        let t = (rho / self.scale).powf(1.0 / self.n);
        let mut phi = FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..MAX_ITERATIONS {
            let s = e * phi.sin();
            let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - s) / (1.0 + s)).powf(e / 2.0)).atan();
            let delta = (next - phi).abs();
            phi = next;
            if delta < LAT_TOLERANCE {
                break;
            }
        }

        Coord::new(self.lon_0 + lam.to_degrees(), phi.to_degrees(), c.z)
    }

    fn proj_params(&self) -> Vec<String> {
        let mut params = super::ellps_params(&self.ellipsoid);
        params.push(format!("lat_0={}", self.lat_0));
        params.push(format!("lon_0={}", self.lon_0));
        params.push(format!("lat_1={}", self.lat_1));
        params.push(format!("lat_2={}", self.lat_2));
        if self.k_0 != 1.0 {
            params.push(format!("k_0={}", self.k_0));
        }
        params.push(format!("x_0={}", self.x_0));
        params.push(format!("y_0={}", self.y_0));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clarke1866() -> Ellipsoid {
        Ellipsoid::from_axes(6_378_206.4, 6_356_583.8).unwrap()
    }

    #[test]
    fn test_snyder_worked_example() {
        // Snyder, Map Projections - A Working Manual, p. 296
        let proj =
            LambertConformal::new(clarke1866(), 23.0, -96.0, 33.0, 45.0, 1.0, 0.0, 0.0).unwrap();
        assert!((proj.cone_constant() - 0.630_496_5).abs() < 1e-6);

        let xy = proj.forward(Coord::xy(-75.0, 35.0));
        assert!((xy.x - 1_894_410.9).abs() < 1.0, "x = {}", xy.x);
        assert!((xy.y - 1_564_649.5).abs() < 1.0, "y = {}", xy.y);
    }

    #[test]
    fn test_origin_maps_to_false_origin() {
        let proj = LambertConformal::new(
            Ellipsoid::GRS80,
            46.5,
            3.0,
            49.0,
            44.0,
            1.0,
            700_000.0,
            6_600_000.0,
        )
        .unwrap();
        let xy = proj.forward(Coord::xy(3.0, 46.5));
        assert!((xy.x - 700_000.0).abs() < 1e-6);
        assert!((xy.y - 6_600_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_roundtrip() {
        let proj =
            LambertConformal::new(Ellipsoid::WGS84, 38.5, -97.5, 38.5, 38.5, 1.0, 0.0, 0.0)
                .unwrap();
        for &(lon, lat) in &[(-122.7, 21.1), (-94.5, 39.0), (-70.0, 50.0), (-97.5, 80.0)] {
            let back = proj.inverse(proj.forward(Coord::xy(lon, lat)));
            assert!((back.x - lon).abs() < 1e-9, "lon {} vs {}", back.x, lon);
            assert!((back.y - lat).abs() < 1e-9, "lat {} vs {}", back.y, lat);
        }
    }

    #[test]
    fn test_southern_cone_roundtrip() {
        let proj =
            LambertConformal::new(Ellipsoid::GRS80, -32.0, 135.0, -28.0, -36.0, 1.0, 0.0, 0.0)
                .unwrap();
        assert!(proj.cone_constant() < 0.0);
        let back = proj.inverse(proj.forward(Coord::xy(140.0, -30.0)));
        assert!((back.x - 140.0).abs() < 1e-9);
        assert!((back.y + 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_opposite_pole_is_invalid() {
        let proj =
            LambertConformal::new(Ellipsoid::WGS84, 40.0, 0.0, 35.0, 45.0, 1.0, 0.0, 0.0).unwrap();
        assert!(!proj.forward(Coord::xy(0.0, -90.0)).is_valid());
        assert!(proj.forward(Coord::xy(0.0, 90.0)).is_valid());
    }

    #[test]
    fn test_rejects_bad_parallels() {
        let e = Ellipsoid::WGS84;
        assert!(LambertConformal::new(e, 0.0, 0.0, 30.0, -30.0, 1.0, 0.0, 0.0).is_err());
        assert!(LambertConformal::new(e, 0.0, 0.0, 90.0, 45.0, 1.0, 0.0, 0.0).is_err());
        assert!(LambertConformal::new(e, 0.0, 0.0, 30.0, 45.0, 0.0, 0.0, 0.0).is_err());
    }
}
