//! Web Mercator tile pyramid definitions.
//!
//! Ground resolution for a zoom level follows the standard pyramid formula
//! `2 * PI * R / (tile_size * 2^zoom)`.

use crate::BoundingBox;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Equatorial radius of the Earth in meters (WGS84).
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Highest zoom level accepted by [`TileGrid`].
pub const MAX_ZOOM: u32 = 30;

/// A tile coordinate (z/x/y), XYZ convention with the origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// True when `x` and `y` lie inside the `2^z` by `2^z` tile matrix.
    pub fn is_valid(&self) -> bool {
        self.z <= MAX_ZOOM && u64::from(self.x.max(self.y)) < (1u64 << self.z)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

impl FromStr for TileCoord {
    type Err = TileGridError;

    /// Parse `z/x/y`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split('/')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| TileGridError::InvalidTile(s.to_string()))?;
        match parts[..] {
            [z, x, y] => Ok(Self::new(z, x, y)),
            _ => Err(TileGridError::InvalidTile(s.to_string())),
        }
    }
}

/// The web-mercator tile pyramid that output rasters align to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    /// Tile width/height in pixels.
    pub tile_size: u32,
    /// Sphere radius used by the pyramid formula (meters).
    pub earth_radius: f64,
}

impl Default for TileGrid {
    fn default() -> Self {
        Self {
            tile_size: 256,
            earth_radius: EARTH_RADIUS,
        }
    }
}

impl TileGrid {
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size,
            ..Self::default()
        }
    }

    /// Half of the projected world width (meters); the grid spans
    /// `[-origin_shift, origin_shift]` on both axes.
    pub fn origin_shift(&self) -> f64 {
        std::f64::consts::PI * self.earth_radius
    }

    /// Check that a zoom level can be used with this grid.
    pub fn validate_zoom(&self, zoom: u32) -> Result<(), TileGridError> {
        if zoom > MAX_ZOOM {
            return Err(TileGridError::InvalidZoom(zoom));
        }
        if self.tile_size == 0 {
            return Err(TileGridError::InvalidTileSize(self.tile_size));
        }
        Ok(())
    }

    /// Ground resolution (meters per pixel) at `zoom`.
    pub fn resolution(&self, zoom: u32) -> Result<f64, TileGridError> {
        self.validate_zoom(zoom)?;
        let tiles = (1u64 << zoom) as f64;
        Ok(2.0 * self.origin_shift() / (self.tile_size as f64 * tiles))
    }

    /// Coarsest zoom level whose resolution is at least as fine as `resolution`.
    pub fn zoom_for_resolution(&self, resolution: f64) -> u32 {
        let base = 2.0 * self.origin_shift() / self.tile_size as f64;
        let exact = (base / resolution).log2();
        // Resolutions computed by `resolution()` land within rounding noise
        // of an integer zoom and must map back to it.
        let zoom = if (exact - exact.round()).abs() < 1e-9 {
            exact.round()
        } else {
            exact.ceil()
        };
        if zoom.is_nan() || zoom < 0.0 {
            0
        } else {
            (zoom as u32).min(MAX_ZOOM)
        }
    }

    /// Projected bounding box of a tile.
    pub fn tile_bbox(&self, coord: &TileCoord) -> BoundingBox {
        let span = 2.0 * self.origin_shift() / (1u64 << coord.z) as f64;
        let min_x = -self.origin_shift() + coord.x as f64 * span;
        let max_y = self.origin_shift() - coord.y as f64 * span;
        BoundingBox::new(min_x, max_y - span, min_x + span, max_y)
    }

    /// Tiles at `zoom` intersecting a projected bounding box, row-major.
    pub fn tiles_covering(&self, bbox: &BoundingBox, zoom: u32) -> Vec<TileCoord> {
        let n = 1u64 << zoom;
        let span = 2.0 * self.origin_shift() / n as f64;
        let to_index = |v: f64| v.clamp(0.0, (n - 1) as f64) as u32;

        let eps = 1e-9;

        let x0 = to_index(((bbox.min_x + self.origin_shift()) / span + eps).floor());
        let x1 = to_index(((bbox.max_x + self.origin_shift()) / span - eps).ceil() - 1.0);
        let y0 = to_index(((self.origin_shift() - bbox.max_y) / span + eps).floor());
        let y1 = to_index(((self.origin_shift() - bbox.min_y) / span - eps).ceil() - 1.0);

        let mut tiles = Vec::new();
        for y in y0..=y1 {
            for x in x0..=x1 {
                tiles.push(TileCoord::new(zoom, x, y));
            }
        }
        tiles
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileGridError {
    #[error("Invalid zoom level {0}, expected 0..=30")]
    InvalidZoom(u32),

    #[error("Invalid tile size {0}")]
    InvalidTileSize(u32),

    #[error("Invalid tile '{0}', expected 'z/x/y'")]
    InvalidTile(String),
}
