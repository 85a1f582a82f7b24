//! Ellipsoidal Transverse Mercator projection.
//!
//! Forward and inverse follow the series of Snyder, "Map Projections - A
//! Working Manual" (USGS PP 1395), pp. 61-64. The inverse series is refined
//! against the forward equations so that forward/inverse round-trip to
//! sub-millimetre precision anywhere within a few zones of the central
//! meridian.

use super::Transform;
use crate::numeric::refine_inverse;
use crate::{Coord, Ellipsoid, ProjectionError, Result};

/// Transverse Mercator parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TransverseMercator {
    pub ellipsoid: Ellipsoid,
    /// Latitude of origin (degrees)
    pub lat_0: f64,
    /// Central meridian (degrees)
    pub lon_0: f64,
    /// Scale factor on the central meridian
    pub k_0: f64,
    /// False easting (meters)
    pub x_0: f64,
    /// False northing (meters)
    pub y_0: f64,
    /// Meridional arc at `lat_0`
    m_0: f64,
}

impl TransverseMercator {
    pub fn new(
        ellipsoid: Ellipsoid,
        lat_0: f64,
        lon_0: f64,
        k_0: f64,
        x_0: f64,
        y_0: f64,
    ) -> Result<Self> {
        if !k_0.is_finite() || k_0 <= 0.0 {
            return Err(ProjectionError::invalid(
                "tmerc",
                format!("k_0 must be positive, got {}", k_0),
            ));
        }
        if !lat_0.is_finite() || lat_0.abs() > 90.0 {
            return Err(ProjectionError::invalid(
                "tmerc",
                format!("lat_0 out of range: {}", lat_0),
            ));
        }
        if !lon_0.is_finite() || !x_0.is_finite() || !y_0.is_finite() {
            return Err(ProjectionError::invalid(
                "tmerc",
                "lon_0, x_0 and y_0 must be finite",
            ));
        }

        Ok(Self {
            ellipsoid,
            lat_0,
            lon_0,
            k_0,
            x_0,
            y_0,
            m_0: ellipsoid.meridional_arc(lat_0.to_radians()),
        })
    }

    /// UTM zone projection on WGS84 (zone 1..=60).
    pub fn utm(zone: u32, north: bool) -> Result<Self> {
        if !(1..=60).contains(&zone) {
            return Err(ProjectionError::invalid(
                "utm",
                format!("zone must be 1..=60, got {}", zone),
            ));
        }
        let lon_0 = (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0;
        let y_0 = if north { 0.0 } else { 10_000_000.0 };
        Self::new(Ellipsoid::WGS84, 0.0, lon_0, 0.9996, 500_000.0, y_0)
    }

    /// Forward equations in raw form: (lon°, lat°) -> (E, N).
    fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let e = &self.ellipsoid;
        let es = e.es();
        let ep2 = e.second_es();

        let phi = lat.to_radians();
        let lam = super::wrap_pi((lon - self.lon_0).to_radians());

        let sin_phi = phi.sin();
        let cos_phi = phi.cos();
        let tan_phi = phi.tan();

        let n = e.a / (1.0 - es * sin_phi * sin_phi).sqrt();
        let t = tan_phi * tan_phi;
        let c = ep2 * cos_phi * cos_phi;
        let a = cos_phi * lam;
        let m = e.meridional_arc(phi);

        let a2 = a * a;
        let a3 = a2 * a;
        let a4 = a2 * a2;
        let a5 = a4 * a;
        let a6 = a4 * a2;

        let x = self.k_0
            * n
            * (a + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0);
        let y = self.k_0
            * (m - self.m_0
                + n * tan_phi
                    * (a2 / 2.0
                        + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                        + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));

        (x + self.x_0, y + self.y_0)
    }

    /// Inverse series (Snyder 8-18 .. 8-25): (E, N) -> (lon°, lat°).
    fn unproject_series(&self, x: f64, y: f64) -> (f64, f64) {
        let e = &self.ellipsoid;
        let es = e.es();
        let ep2 = e.second_es();
        let e4 = es * es;
        let e6 = e4 * es;

        let m = self.m_0 + (y - self.y_0) / self.k_0;
        let mu = m / (e.a * (1.0 - es / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

        let sq = (1.0 - es).sqrt();
        let e1 = (1.0 - sq) / (1.0 + sq);
        let e1_2 = e1 * e1;
        let e1_3 = e1_2 * e1;
        let e1_4 = e1_2 * e1_2;

        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

        let sin1 = phi1.sin();
        let cos1 = phi1.cos();
        let tan1 = phi1.tan();

        let c1 = ep2 * cos1 * cos1;
        let t1 = tan1 * tan1;
        let w = 1.0 - es * sin1 * sin1;
        let n1 = e.a / w.sqrt();
        let r1 = e.a * (1.0 - es) / w.powf(1.5);
        let d = (x - self.x_0) / (n1 * self.k_0);

        let d2 = d * d;
        let d3 = d2 * d;
        let d4 = d2 * d2;
        let d5 = d4 * d;
        let d6 = d4 * d2;

        let phi = phi1
            - (n1 * tan1 / r1)
                * (d2 / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d4 / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                        - 252.0 * ep2
                        - 3.0 * c1 * c1)
                        * d6
                        / 720.0);
        let lam = (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d5
                / 120.0)
            / cos1;

        (self.lon_0 + lam.to_degrees(), phi.to_degrees())
    }
}

impl Transform for TransverseMercator {
    fn name(&self) -> &'static str {
        "tmerc"
    }

    fn forward(&self, c: Coord) -> Coord {
        if c.y.abs() >= 90.0 {
            return Coord::invalid();
        }
        let (x, y) = self.project(c.x, c.y);
        Coord::new(x, y, c.z)
    }

    fn inverse(&self, c: Coord) -> Coord {
        let guess = self.unproject_series(c.x, c.y);
        if !guess.0.is_finite() || !guess.1.is_finite() {
            return Coord::invalid();
        }
        match refine_inverse(
            |lon, lat| self.project(lon, lat),
            (c.x, c.y),
            guess,
            1e-7,
            1e-7,
        ) {
            Some((lon, lat)) if lat.abs() < 90.0 => Coord::new(lon, lat, c.z),
            _ => Coord::invalid(),
        }
    }

    fn proj_params(&self) -> Vec<String> {
        let mut params = super::ellps_params(&self.ellipsoid);
        params.push(format!("lat_0={}", self.lat_0));
        params.push(format!("lon_0={}", self.lon_0));
        params.push(format!("k_0={}", self.k_0));
        params.push(format!("x_0={}", self.x_0));
        params.push(format!("y_0={}", self.y_0));
        params
    }
}
