//! Geodetic <-> geocentric (earth-centred, earth-fixed) conversion.

use super::Transform;
use crate::{Coord, Ellipsoid};

const MAX_ITERATIONS: usize = 20;
const LAT_TOLERANCE: f64 = 1e-14;

/// `+proj=cart`: (lon°, lat°, h) <-> (X, Y, Z) on a given ellipsoid.
#[derive(Debug, Clone, PartialEq)]
pub struct Geocentric {
    pub ellipsoid: Ellipsoid,
}

impl Geocentric {
    pub fn new(ellipsoid: Ellipsoid) -> Self {
        Self { ellipsoid }
    }
}

impl Default for Geocentric {
    fn default() -> Self {
        Self::new(Ellipsoid::WGS84)
    }
}

impl Transform for Geocentric {
    fn name(&self) -> &'static str {
        "cart"
    }

    fn forward(&self, c: Coord) -> Coord {
        if c.y.abs() > 90.0 {
            return Coord::invalid();
        }
        let lam = c.x.to_radians();
        let phi = c.y.to_radians();
        let h = if c.z.is_finite() { c.z } else { 0.0 };
        let n = self.ellipsoid.prime_vertical_radius(phi);
        let es = self.ellipsoid.es();

        Coord::new(
            (n + h) * phi.cos() * lam.cos(),
            (n + h) * phi.cos() * lam.sin(),
            (n * (1.0 - es) + h) * phi.sin(),
        )
    }

    fn inverse(&self, c: Coord) -> Coord {
        let Coord { x, y, z } = c;
        if !z.is_finite() {
            return Coord::invalid();
        }
        let a = self.ellipsoid.a;
        let es = self.ellipsoid.es();
        let p = x.hypot(y);
        let lam = y.atan2(x);

        if p < 1e-9 {
            // On the polar axis
            let phi = if z >= 0.0 { 90.0 } else { -90.0 };
            return Coord::new(lam.to_degrees(), phi, z.abs() - self.ellipsoid.b());
        }

        let mut phi = z.atan2(p * (1.0 - es));
        for _ in 0..MAX_ITERATIONS {
            let n = self.ellipsoid.prime_vertical_radius(phi);
            let h = p * phi.cos() + z * phi.sin() - a * a / n;
            let next = z.atan2(p * (1.0 - es * n / (n + h)));
            let delta = (next - phi).abs();
            phi = next;
            if delta < LAT_TOLERANCE {
                break;
            }
        }
        let s = phi.sin();
        let h = p * phi.cos() + z * s - a * (1.0 - es * s * s).sqrt();

        Coord::new(lam.to_degrees(), phi.to_degrees(), h)
    }

    fn proj_params(&self) -> Vec<String> {
        super::ellps_params(&self.ellipsoid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equator_prime_meridian() {
        let cart = Geocentric::default();
        let xyz = cart.forward(Coord::new(0.0, 0.0, 0.0));
        assert!((xyz.x - 6_378_137.0).abs() < 1e-6);
        assert!(xyz.y.abs() < 1e-6);
        assert!(xyz.z.abs() < 1e-6);
    }

    #[test]
    fn test_north_pole() {
        let cart = Geocentric::default();
        let xyz = cart.forward(Coord::new(0.0, 90.0, 10.0));
        assert!((xyz.z - (Ellipsoid::WGS84.b() + 10.0)).abs() < 1e-6);
        let back = cart.inverse(xyz);
        assert!((back.y - 90.0).abs() < 1e-9);
        assert!((back.z - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_roundtrip_with_height() {
        let cart = Geocentric::new(Ellipsoid::BESSEL);
        for &(lon, lat, h) in &[
            (17.1, 48.15, 250.0),
            (-120.0, -33.0, 0.0),
            (179.0, 89.5, 4000.0),
            (0.0, -12.0, -80.0),
        ] {
            let back = cart.inverse(cart.forward(Coord::new(lon, lat, h)));
            assert!((back.x - lon).abs() < 1e-10, "lon {}", back.x);
            assert!((back.y - lat).abs() < 1e-10, "lat {}", back.y);
            assert!((back.z - h).abs() < 1e-5, "h {}", back.z);
        }
    }
}
