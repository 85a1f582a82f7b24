//! Krovak oblique conformal conic projection (S-JTSK).
//!
//! The ellipsoid is mapped conformally onto a Gaussian sphere, the sphere is
//! rotated so the cone axis passes through the pole of the oblique system,
//! and the result is projected onto a cone tangent along the pseudo standard
//! parallel. Equations follow EPSG Guidance Note 7-2, method 9819.
//!
//! Output is east/north (EPSG:5514 axis order): negated westing and
//! southing. With `czech` the raw westing/southing are returned instead.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use super::Transform;
use crate::{Coord, Ellipsoid, ProjectionError, Result};

/// Latitude of the projection centre, 49°30'N.
pub const DEFAULT_LAT_0: f64 = 49.5;

/// Longitude of origin, 42°30'E of Ferro expressed from Greenwich.
pub const DEFAULT_LON_0: f64 = 24.833_333_333_333_33;

/// Azimuth of the cone axis at the projection centre (degrees).
pub const DEFAULT_ALPHA: f64 = 30.288_139_722_222_22;

pub const DEFAULT_K_0: f64 = 0.9999;

/// Latitude of the pseudo standard parallel, 78°30'N.
const PSEUDO_PARALLEL: f64 = 78.5;

const MAX_ITERATIONS: usize = 100;
const LAT_TOLERANCE: f64 = 1e-15;

#[derive(Debug, Clone, PartialEq)]
pub struct Krovak {
    pub ellipsoid: Ellipsoid,
    pub lat_0: f64,
    pub lon_0: f64,
    pub alpha: f64,
    pub k_0: f64,
    pub x_0: f64,
    pub y_0: f64,
    /// Return positive westing/southing instead of east/north.
    pub czech: bool,
    /// `B`: exponent of the conformal sphere mapping
    b: f64,
    /// `t0`: constant of the conformal sphere mapping
    t0: f64,
    /// `n`: cone constant
    n: f64,
    /// `r0 / a`: radius of the pseudo standard parallel
    r0: f64,
}

impl Krovak {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ellipsoid: Ellipsoid,
        lat_0: f64,
        lon_0: f64,
        alpha: f64,
        k_0: f64,
        x_0: f64,
        y_0: f64,
        czech: bool,
    ) -> Result<Self> {
        if !lat_0.is_finite() || lat_0 <= 0.0 || lat_0 >= 90.0 {
            return Err(ProjectionError::invalid(
                "krovak",
                format!("lat_0 must lie in (0, 90), got {}", lat_0),
            ));
        }
        if !alpha.is_finite() || alpha.abs() >= 90.0 {
            return Err(ProjectionError::invalid(
                "krovak",
                format!("alpha must lie in (-90, 90), got {}", alpha),
            ));
        }
        if !k_0.is_finite() || k_0 <= 0.0 {
            return Err(ProjectionError::invalid(
                "krovak",
                format!("k_0 must be positive, got {}", k_0),
            ));
        }
        if !lon_0.is_finite() || !x_0.is_finite() || !y_0.is_finite() {
            return Err(ProjectionError::invalid(
                "krovak",
                "lon_0, x_0 and y_0 must be finite",
            ));
        }

        let es = ellipsoid.es();
        let e = ellipsoid.e();
        let phi_c = lat_0.to_radians();
        let (sin_c, cos_c) = phi_c.sin_cos();

        let a_ratio = (1.0 - es).sqrt() / (1.0 - es * sin_c * sin_c);
        let b = (1.0 + es * cos_c.powi(4) / (1.0 - es)).sqrt();
        let gamma_0 = (sin_c / b).asin();
        let t0 = (FRAC_PI_4 + gamma_0 / 2.0).tan()
            * ((1.0 + e * sin_c) / (1.0 - e * sin_c)).powf(e * b / 2.0)
            / (FRAC_PI_4 + phi_c / 2.0).tan().powf(b);
        let phi_p = PSEUDO_PARALLEL.to_radians();
        let n = phi_p.sin();
        let r0 = k_0 * a_ratio / phi_p.tan();

        if !t0.is_finite() || !r0.is_finite() || !b.is_finite() {
            return Err(ProjectionError::invalid(
                "krovak",
                "degenerate projection constants",
            ));
        }

        Ok(Self {
            ellipsoid,
            lat_0,
            lon_0,
            alpha,
            k_0,
            x_0,
            y_0,
            czech,
            b,
            t0,
            n,
            r0,
        })
    }

    fn axis_sign(&self) -> f64 {
        if self.czech {
            1.0
        } else {
            -1.0
        }
    }

    /// `tan(pi/4 + phi_p/2)^n`, shared by both directions.
    fn parallel_term(&self) -> f64 {
        (FRAC_PI_4 + PSEUDO_PARALLEL.to_radians() / 2.0).tan().powf(self.n)
    }
}

impl Transform for Krovak {
    fn name(&self) -> &'static str {
        "krovak"
    }

    fn forward(&self, c: Coord) -> Coord {
        if c.y.abs() >= 90.0 {
            return Coord::invalid();
        }
        let e = self.ellipsoid.e();
        let phi = c.y.to_radians();
        let esin = e * phi.sin();
        let alpha_c = self.alpha.to_radians();

        let u = 2.0
            * ((self.t0 * (phi / 2.0 + FRAC_PI_4).tan().powf(self.b)
                / ((1.0 + esin) / (1.0 - esin)).powf(e * self.b / 2.0))
            .atan()
                - FRAC_PI_4);
        let v = self.b * super::wrap_pi((self.lon_0 - c.x).to_radians());

        let t = (alpha_c.cos() * u.sin() + alpha_c.sin() * u.cos() * v.cos()).asin();
        let cos_t = t.cos();
        if cos_t < 1e-12 {
            return Coord::invalid();
        }
        let d = (u.cos() * v.sin() / cos_t).asin();

        let theta = self.n * d;
        let r = self.r0 * self.parallel_term() / (t / 2.0 + FRAC_PI_4).tan().powf(self.n);

        let a = self.ellipsoid.a * self.axis_sign();
        let westing = r * theta.sin();
        let southing = r * theta.cos();
        Coord::new(self.x_0 + a * westing, self.y_0 + a * southing, c.z)
    }

    fn inverse(&self, c: Coord) -> Coord {
        let e = self.ellipsoid.e();
        let a = self.ellipsoid.a * self.axis_sign();
        let westing = (c.x - self.x_0) / a;
        let southing = (c.y - self.y_0) / a;
        let alpha_c = self.alpha.to_radians();

        let r = westing.hypot(southing);
        let theta = westing.atan2(southing);
        let d = theta / PSEUDO_PARALLEL.to_radians().sin();
        let t = if r == 0.0 {
            FRAC_PI_2
        } else {
            2.0 * (((self.r0 / r).powf(1.0 / self.n)
                * (FRAC_PI_4 + PSEUDO_PARALLEL.to_radians() / 2.0).tan())
            .atan()
                - FRAC_PI_4)
        };

        let u = (alpha_c.cos() * t.sin() - alpha_c.sin() * t.cos() * d.cos()).asin();
        let v = (t.cos() * d.sin() / u.cos()).asin();
        let lon = self.lon_0 - (v / self.b).to_degrees();

        let base = self.t0.powf(-1.0 / self.b) * (u / 2.0 + FRAC_PI_4).tan().powf(1.0 / self.b);
        let mut phi = u;
        for _ in 0..MAX_ITERATIONS {
            let esin = e * phi.sin();
            let next = 2.0 * ((base * ((1.0 + esin) / (1.0 - esin)).powf(e / 2.0)).atan() - FRAC_PI_4);
            if !next.is_finite() {
                return Coord::invalid();
            }
            let delta = (next - phi).abs();
            phi = next;
            if delta < LAT_TOLERANCE {
                return Coord::new(lon, phi.to_degrees(), c.z);
            }
        }
        Coord::invalid()
    }

    fn proj_params(&self) -> Vec<String> {
        let mut params = super::ellps_params(&self.ellipsoid);
        params.push(format!("lat_0={}", self.lat_0));
        params.push(format!("lon_0={}", self.lon_0));
        params.push(format!("alpha={}", self.alpha));
        params.push(format!("k_0={}", self.k_0));
        params.push(format!("x_0={}", self.x_0));
        params.push(format!("y_0={}", self.y_0));
        if self.czech {
            params.push("czech".to_string());
        }
        params
    }
}
