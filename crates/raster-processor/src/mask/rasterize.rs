//! Scanline burning of healed rings with the nonzero winding rule.

use ortho_common::GeoTransform;

use super::heal::OrientedRing;
use crate::error::{GeometryError, RasterProcessorError, Result};

/// An edge in pixel space, kept only if it is not horizontal.
#[derive(Debug, Clone, Copy)]
struct Edge {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

/// The edges of one coverage layer in the pixel space of a raster.
#[derive(Debug, Clone)]
pub struct LayerEdges {
    edges: Vec<Edge>,
    /// Sign of the ground-to-pixel determinant; a north-up transform
    /// flips orientation.
    orientation: i32,
}

impl LayerEdges {
    /// Map the rings of a layer through the inverse of `geotransform`.
    pub fn new(rings: &[OrientedRing], geotransform: &GeoTransform) -> Result<Self> {
        let inverse = geotransform.inverse().map_err(|e| {
            RasterProcessorError::configuration(format!("mask grid: {}", e))
        })?;
        let det = inverse.a * inverse.e - inverse.b * inverse.d;
        let mut edges = Vec::new();
        for ring in rings {
            let n = ring.points.len();
            let pixels: Vec<(f64, f64)> = ring
                .points
                .iter()
                .map(|&[x, y]| inverse.pixel_to_geo(x, y))
                .collect();
            for k in 0..n {
                let (x0, y0) = pixels[k];
                let (x1, y1) = pixels[(k + 1) % n];
                if y0 != y1 {
                    edges.push(Edge { x0, y0, x1, y1 });
                }
            }
        }
        if edges.is_empty() {
            return Err(GeometryError::Empty("layer has no edges".to_string()).into());
        }
        Ok(Self {
            edges,
            orientation: if det < 0.0 { -1 } else { 1 },
        })
    }

    /// AND the layer into `inside` for pixel row `row`, columns
    /// `col_off .. col_off + inside.len()`.
    ///
    /// A pixel is inside when the winding number at its centre is positive.
    pub fn intersect_row(&self, row: i64, col_off: i64, inside: &mut [bool]) {
        let y = row as f64 + 0.5;

        // (x, direction) of every edge crossing the scanline. Ring
        // orientation already carries the exterior/hole sign.
        let mut crossings: Vec<(f64, i32)> = self
            .edges
            .iter()
            .filter_map(|e| {
                let dir = if e.y0 <= y && y < e.y1 {
                    1
                } else if e.y1 <= y && y < e.y0 {
                    -1
                } else {
                    return None;
                };
                let x = e.x0 + (y - e.y0) * (e.x1 - e.x0) / (e.y1 - e.y0);
                Some((x, dir))
            })
            .collect();
        crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Running sum over crossings left of the pixel centre equals minus
        // the winding number of the rightward ray.
        let mut next = 0;
        let mut left_sum = 0i32;
        for (i, cell) in inside.iter_mut().enumerate() {
            let x = (col_off + i as i64) as f64 + 0.5;
            while next < crossings.len() && crossings[next].0 < x {
                left_sum += crossings[next].1;
                next += 1;
            }
            let winding = -left_sum * self.orientation;
            *cell &= winding > 0;
        }
    }
}
