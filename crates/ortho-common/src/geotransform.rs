//! Affine geotransforms mapping pixel indices to ground coordinates.

use crate::BoundingBox;
use serde::{Deserialize, Serialize};

/// Affine transform from pixel space `(col, row)` to ground space `(x, y)`:
///
/// ```text
/// x = c + a * col + b * row
/// y = f + d * col + e * row
/// ```
///
/// Pixel `(0, 0)` refers to the top-left *corner* of the top-left pixel;
/// pixel centres sit at `+0.5`. Serialized in GDAL order `[c, a, b, f, d, e]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 6]", into = "[f64; 6]")]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    /// North-up transform with the given top-left corner and pixel size.
    ///
    /// `res_y` is the positive pixel height; rows grow southwards.
    pub fn north_up(origin_x: f64, origin_y: f64, res_x: f64, res_y: f64) -> Self {
        Self {
            a: res_x,
            b: 0.0,
            c: origin_x,
            d: 0.0,
            e: -res_y,
            f: origin_y,
        }
    }

    /// Create from a GDAL-style array `[c, a, b, f, d, e]`.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            c: gt[0],
            a: gt[1],
            b: gt[2],
            f: gt[3],
            d: gt[4],
            e: gt[5],
        }
    }

    /// Convert to a GDAL-style array `[c, a, b, f, d, e]`.
    pub fn to_gdal(&self) -> [f64; 6] {
        [self.c, self.a, self.b, self.f, self.d, self.e]
    }

    /// Build from the six lines of an ESRI world file (A, D, B, E, C, F).
    ///
    /// World files reference the *centre* of the top-left pixel; the result
    /// is shifted to the corner convention used here.
    pub fn from_world_file(values: [f64; 6]) -> Self {
        let [a, d, b, e, c, f] = values;
        Self {
            a,
            b,
            c: c - 0.5 * a - 0.5 * b,
            d,
            e,
            f: f - 0.5 * d - 0.5 * e,
        }
    }

    /// Map a pixel-space position to ground coordinates.
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.c + self.a * col + self.b * row,
            self.f + self.d * col + self.e * row,
        )
    }

    /// Map ground coordinates to a fractional pixel-space position.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> Result<(f64, f64), GeoTransformError> {
        Ok(self.inverse()?.pixel_to_geo(x, y))
    }

    /// Inverse affine (ground -> pixel), expressed as another `GeoTransform`.
    pub fn inverse(&self) -> Result<GeoTransform, GeoTransformError> {
        let det = self.a * self.e - self.b * self.d;
        if det.abs() < f64::EPSILON || !det.is_finite() {
            return Err(GeoTransformError::Singular);
        }
        let inv_det = 1.0 / det;
        Ok(GeoTransform {
            a: self.e * inv_det,
            b: -self.b * inv_det,
            c: (self.b * self.f - self.e * self.c) * inv_det,
            d: -self.d * inv_det,
            e: self.a * inv_det,
            f: (self.d * self.c - self.a * self.f) * inv_det,
        })
    }

    /// True when the transform has no rotation/shear terms.
    pub fn is_north_up(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }

    /// Pixel size `(width, height)` as positive ground distances.
    pub fn pixel_size(&self) -> (f64, f64) {
        (
            (self.a * self.a + self.d * self.d).sqrt(),
            (self.b * self.b + self.e * self.e).sqrt(),
        )
    }

    /// Ground bounding box of a `width` x `height` raster.
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let mut bbox = BoundingBox::empty();
        for (col, row) in [
            (0.0, 0.0),
            (width as f64, 0.0),
            (0.0, height as f64),
            (width as f64, height as f64),
        ] {
            let (x, y) = self.pixel_to_geo(col, row);
            bbox.extend(x, y);
        }
        bbox
    }

    /// Transform of the sub-raster whose top-left pixel is `(col_off, row_off)`.
    pub fn window_transform(&self, col_off: i64, row_off: i64) -> GeoTransform {
        let (c, f) = self.pixel_to_geo(col_off as f64, row_off as f64);
        GeoTransform { c, f, ..*self }
    }

    /// Transform of the same extent at a coarser (`factor` > 1) resolution.
    pub fn scaled(&self, factor: f64) -> GeoTransform {
        GeoTransform {
            a: self.a * factor,
            b: self.b * factor,
            d: self.d * factor,
            e: self.e * factor,
            ..*self
        }
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(gt: [f64; 6]) -> Self {
        Self::from_gdal(gt)
    }
}

impl From<GeoTransform> for [f64; 6] {
    fn from(gt: GeoTransform) -> Self {
        gt.to_gdal()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeoTransformError {
    #[error("Singular geotransform (determinant is zero)")]
    Singular,
}
