//! Mapping between output pixels and source pixels, and per-block plans.

use ortho_common::{BoundingBox, GeoTransform};
use projection::{Coord, CoordinatePipeline};

use crate::error::{RasterProcessorError, Result};
use crate::source::RasterSource;
use crate::types::Window;

/// Ground extent of `source` after the forward pipeline.
///
/// Each source edge is sampled at `edge_samples` points (corners included)
/// since a corner-only transform misses the bulge of curved edges.
/// Non-finite results are skipped.
pub fn transformed_extent(
    source: &dyn RasterSource,
    pipeline: &CoordinatePipeline,
    edge_samples: usize,
) -> Result<BoundingBox> {
    let gt = source.geotransform();
    let (w, h) = (source.width() as f64, source.height() as f64);
    let mut bbox = BoundingBox::empty();
    let mut hits = 0usize;

    for (col, row) in edge_points(0.0, 0.0, w, h, edge_samples) {
        let (x, y) = gt.pixel_to_geo(col, row);
        let c = pipeline.forward(Coord::xy(x, y));
        if c.is_valid() {
            bbox.extend(c.x, c.y);
            hits += 1;
        }
    }

    if hits == 0 {
        return Err(RasterProcessorError::configuration(
            "no point of the source boundary can be transformed to the target reference",
        ));
    }
    Ok(bbox)
}

/// `samples` points along each edge of the rectangle, corners included.
fn edge_points(x0: f64, y0: f64, x1: f64, y1: f64, samples: usize) -> Vec<(f64, f64)> {
    let n = samples.max(2);
    let mut points = Vec::with_capacity(4 * n);
    for k in 0..n {
        let t = k as f64 / (n - 1) as f64;
        let x = x0 + t * (x1 - x0);
        let y = y0 + t * (y1 - y0);
        points.push((x, y0));
        points.push((x, y1));
        points.push((x0, y));
        points.push((x1, y));
    }
    points
}

/// What one output block needs from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPlan {
    /// The output block.
    pub window: Window,
    /// Source pixels to read, halo included, clipped to the source.
    pub source_window: Window,
    /// Source pixels per output pixel along output columns and rows.
    pub scale: (f64, f64),
}

/// Maps output pixels to source pixels through the inverse pipeline.
pub struct PixelMapper<'a> {
    pipeline: &'a CoordinatePipeline,
    target: GeoTransform,
    source_inverse: GeoTransform,
    source_width: usize,
    source_height: usize,
}

impl<'a> PixelMapper<'a> {
    pub fn new(
        pipeline: &'a CoordinatePipeline,
        target: GeoTransform,
        source: &dyn RasterSource,
    ) -> Result<Self> {
        let source_inverse = source.geotransform().inverse().map_err(|e| {
            RasterProcessorError::configuration(format!("source geotransform: {}", e))
        })?;
        Ok(Self {
            pipeline,
            target,
            source_inverse,
            source_width: source.width(),
            source_height: source.height(),
        })
    }

    /// Source pixel position of output pixel position `(col, row)`.
    ///
    /// `None` when the pipeline cannot map the point.
    #[inline]
    pub fn source_pixel(&self, col: f64, row: f64) -> Option<(f64, f64)> {
        let (x, y) = self.target.pixel_to_geo(col, row);
        let c = self.pipeline.inverse(Coord::xy(x, y));
        if !c.is_valid() {
            return None;
        }
        let (sx, sy) = self.source_inverse.pixel_to_geo(c.x, c.y);
        (sx.is_finite() && sy.is_finite()).then_some((sx, sy))
    }

    /// Source pixels per output pixel around output position `(col, row)`.
    pub fn local_scale(&self, col: f64, row: f64) -> Option<(f64, f64)> {
        let p = self.source_pixel(col, row)?;
        let px = self.source_pixel(col + 1.0, row)?;
        let py = self.source_pixel(col, row + 1.0)?;
        let sx = (px.0 - p.0).hypot(px.1 - p.1);
        let sy = (py.0 - p.0).hypot(py.1 - p.1);
        (sx.is_finite() && sy.is_finite() && sx > 0.0 && sy > 0.0).then_some((sx, sy))
    }

    /// Plan an output block; `None` when it cannot touch the source.
    ///
    /// `halo_for` gives the halo in source pixels for a scale.
    pub fn plan(
        &self,
        window: Window,
        edge_samples: usize,
        halo_for: impl Fn(f64) -> usize,
    ) -> Option<BlockPlan> {
        let (c0, r0) = (window.col_off as f64, window.row_off as f64);
        let (c1, r1) = (window.col_end() as f64, window.row_end() as f64);

        let boundary = edge_points(c0, r0, c1, r1, edge_samples);
        let mut mapped: Vec<(f64, f64)> = Vec::with_capacity(boundary.len());
        let mut all_valid = true;
        for (col, row) in boundary {
            match self.source_pixel(col, row) {
                Some(p) => mapped.push(p),
                None => all_valid = false,
            }
        }

        // A partially mappable boundary can hide a valid interior.
        if !all_valid {
            let n = edge_samples.max(2);
            for j in 0..n {
                for i in 0..n {
                    let col = c0 + (c1 - c0) * (i as f64 + 0.5) / n as f64;
                    let row = r0 + (r1 - r0) * (j as f64 + 0.5) / n as f64;
                    if let Some(p) = self.source_pixel(col, row) {
                        mapped.push(p);
                    }
                }
            }
        }
        if mapped.is_empty() {
            return None;
        }

        let scale = self
            .local_scale((c0 + c1) * 0.5, (r0 + r1) * 0.5)
            .or_else(|| self.local_scale(c0 + 0.5, r0 + 0.5))
            .unwrap_or((1.0, 1.0));
        let halo = halo_for(scale.0).max(halo_for(scale.1)) as i64;

        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &(x, y) in &mapped {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        // Keep the window bounded when the mapping explodes near a pole.
        let limit = (self.source_width.max(self.source_height) as f64) * 4.0 + 1e6;
        let clamp = |v: f64| v.clamp(-limit, limit);
        let col_min = clamp(min_x).floor() as i64 - halo;
        let row_min = clamp(min_y).floor() as i64 - halo;
        let col_max = clamp(max_x).ceil() as i64 + halo;
        let row_max = clamp(max_y).ceil() as i64 + halo;

        let wanted = Window::new(
            col_min,
            row_min,
            (col_max - col_min).max(0) as usize,
            (row_max - row_min).max(0) as usize,
        );
        let source_window = wanted.clip(self.source_width, self.source_height)?;
        Some(BlockPlan {
            window,
            source_window,
            scale,
        })
    }
}
