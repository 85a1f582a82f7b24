//! Output pixel grid and its block partition.

use ortho_common::{BoundingBox, GeoTransform, SpatialRef};
use serde::{Deserialize, Serialize};

use crate::error::{RasterProcessorError, Result};
use crate::types::Window;

/// The pixel grid of one output level.
///
/// Blocks are `block_size` squares anchored at the grid origin; the last
/// block column and row are trimmed to the grid size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputGrid {
    pub srs: SpatialRef,
    pub geotransform: GeoTransform,
    pub width: usize,
    pub height: usize,
    /// Band count including the alpha band, if any.
    pub bands: usize,
    pub has_alpha: bool,
    pub block_size: usize,
    /// Ground size of one pixel (square pixels).
    pub resolution: f64,
    /// Zoom level this grid's resolution was derived from.
    pub zoom: u32,
}

impl OutputGrid {
    /// Number of colour bands (everything except alpha).
    pub fn colour_bands(&self) -> usize {
        if self.has_alpha {
            self.bands - 1
        } else {
            self.bands
        }
    }

    pub fn blocks_x(&self) -> usize {
        self.width.div_ceil(self.block_size)
    }

    pub fn blocks_y(&self) -> usize {
        self.height.div_ceil(self.block_size)
    }

    pub fn block_count(&self) -> usize {
        self.blocks_x() * self.blocks_y()
    }

    /// Pixel window of block `(col, row)`.
    pub fn block_window(&self, col: usize, row: usize) -> Window {
        let col_off = col * self.block_size;
        let row_off = row * self.block_size;
        Window::new(
            col_off as i64,
            row_off as i64,
            self.block_size.min(self.width.saturating_sub(col_off)),
            self.block_size.min(self.height.saturating_sub(row_off)),
        )
    }

    /// All block indices in row-major order.
    pub fn blocks(&self) -> Vec<(usize, usize)> {
        (0..self.blocks_y())
            .flat_map(|row| (0..self.blocks_x()).map(move |col| (col, row)))
            .collect()
    }

    pub fn bounds(&self) -> BoundingBox {
        self.geotransform.bounds(self.width, self.height)
    }

    /// The grid halved `levels` times: same origin, pixel size doubled per
    /// level, dimensions rounded up.
    pub fn level(&self, levels: u32) -> OutputGrid {
        let mut grid = self.clone();
        for _ in 0..levels {
            grid.width = grid.width.div_ceil(2);
            grid.height = grid.height.div_ceil(2);
            grid.geotransform = grid.geotransform.scaled(2.0);
            grid.resolution *= 2.0;
            grid.zoom = grid.zoom.saturating_sub(1);
        }
        grid
    }

    /// True when two grids address the same pixels.
    pub fn same_pixels(&self, other: &OutputGrid) -> bool {
        self.srs == other.srs
            && self.width == other.width
            && self.height == other.height
            && self.bands == other.bands
            && self.has_alpha == other.has_alpha
            && self.block_size == other.block_size
            && self
                .geotransform
                .to_gdal()
                .iter()
                .zip(other.geotransform.to_gdal())
                .all(|(a, b)| (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0))
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RasterProcessorError::configuration("output grid has no pixels"));
        }
        if self.block_size == 0 {
            return Err(RasterProcessorError::configuration("block_size must be > 0"));
        }
        if self.bands == 0 || (self.has_alpha && self.bands < 2) {
            return Err(RasterProcessorError::configuration(format!(
                "output grid has an invalid band layout ({} bands, alpha: {})",
                self.bands, self.has_alpha
            )));
        }
        Ok(())
    }
}
