//! Horizontal datum shift by interpolation in a grid of lon/lat offsets.
//!
//! Grids are stored as JSON:
//!
//! ```json
//! {
//!   "extent": [min_lon, min_lat, max_lon, max_lat],
//!   "cols": 3, "rows": 2,
//!   "dlon": [..], "dlat": [..]
//! }
//! ```
//!
//! Offsets are arc-seconds, row-major with row 0 at `min_lat` (south). Nodes
//! sit on the extent boundary, so node spacing is `width / (cols - 1)`.

use super::Transform;
use crate::{Coord, ProjectionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const MAX_ITERATIONS: usize = 20;
const TOLERANCE_DEG: f64 = 1e-12;

/// A regular grid of longitude/latitude offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftGrid {
    /// `[min_lon, min_lat, max_lon, max_lat]` in degrees
    pub extent: [f64; 4],
    pub cols: usize,
    pub rows: usize,
    /// Longitude offsets (arc-seconds)
    pub dlon: Vec<f64>,
    /// Latitude offsets (arc-seconds)
    pub dlat: Vec<f64>,
}

impl ShiftGrid {
    /// Parse and validate a grid from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let grid: ShiftGrid = serde_json::from_str(json)
            .map_err(|e| ProjectionError::GridShift(format!("invalid grid JSON: {}", e)))?;
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> Result<()> {
        let [min_lon, min_lat, max_lon, max_lat] = self.extent;
        if self.extent.iter().any(|v| !v.is_finite()) || min_lon >= max_lon || min_lat >= max_lat
        {
            return Err(ProjectionError::GridShift(format!(
                "invalid grid extent {:?}",
                self.extent
            )));
        }
        if self.cols < 2 || self.rows < 2 {
            return Err(ProjectionError::GridShift(format!(
                "grid needs at least 2x2 nodes, got {}x{}",
                self.cols, self.rows
            )));
        }
        let n = self.cols * self.rows;
        if self.dlon.len() != n || self.dlat.len() != n {
            return Err(ProjectionError::GridShift(format!(
                "expected {} offsets per component, got dlon={} dlat={}",
                n,
                self.dlon.len(),
                self.dlat.len()
            )));
        }
        if self.dlon.iter().chain(self.dlat.iter()).any(|v| !v.is_finite()) {
            return Err(ProjectionError::GridShift(
                "grid offsets must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let [min_lon, min_lat, max_lon, max_lat] = self.extent;
        lon >= min_lon && lon <= max_lon && lat >= min_lat && lat <= max_lat
    }

    /// Bilinearly interpolated offset `(dlon, dlat)` in degrees, or `None`
    /// outside the grid.
    pub fn offset(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        if !self.contains(lon, lat) {
            return None;
        }
        let [min_lon, min_lat, max_lon, max_lat] = self.extent;
        let fx = (lon - min_lon) / (max_lon - min_lon) * (self.cols - 1) as f64;
        let fy = (lat - min_lat) / (max_lat - min_lat) * (self.rows - 1) as f64;

        let x0 = (fx.floor() as usize).min(self.cols - 2);
        let y0 = (fy.floor() as usize).min(self.rows - 2);
        let tx = fx - x0 as f64;
        let ty = fy - y0 as f64;

        let sample = |values: &[f64]| {
            let idx = |x: usize, y: usize| y * self.cols + x;
            let v00 = values[idx(x0, y0)];
            let v10 = values[idx(x0 + 1, y0)];
            let v01 = values[idx(x0, y0 + 1)];
            let v11 = values[idx(x0 + 1, y0 + 1)];
            let bottom = v00 * (1.0 - tx) + v10 * tx;
            let top = v01 * (1.0 - tx) + v11 * tx;
            (bottom * (1.0 - ty) + top * ty) / 3600.0
        };

        Some((sample(&self.dlon), sample(&self.dlat)))
    }
}

/// Looks up shift grids by name.
pub trait GridResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<ShiftGrid>>;
}

/// Resolver for pipelines that use no grids; every lookup fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGrids;

impl GridResolver for NoGrids {
    fn resolve(&self, name: &str) -> Result<Arc<ShiftGrid>> {
        Err(ProjectionError::GridShift(format!(
            "grid '{}' requested but no grid resolver is configured",
            name
        )))
    }
}

/// Resolves grids from JSON files under a directory.
///
/// A name without extension is looked up as `<name>.json`.
#[derive(Debug, Clone)]
pub struct DirectoryGridResolver {
    root: PathBuf,
}

impl DirectoryGridResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        let path = self.root.join(name);
        if Path::new(name).extension().is_none() {
            path.with_extension("json")
        } else {
            path
        }
    }
}

impl GridResolver for DirectoryGridResolver {
    fn resolve(&self, name: &str) -> Result<Arc<ShiftGrid>> {
        if name.contains("..") {
            return Err(ProjectionError::GridShift(format!(
                "grid name '{}' escapes the grid directory",
                name
            )));
        }
        let path = self.path_for(name);
        let json = std::fs::read_to_string(&path).map_err(|e| {
            ProjectionError::GridShift(format!("cannot read grid {}: {}", path.display(), e))
        })?;
        let grid = ShiftGrid::from_json(&json)?;
        debug!(
            grid = name,
            cols = grid.cols,
            rows = grid.rows,
            "Loaded shift grid"
        );
        Ok(Arc::new(grid))
    }
}

/// In-memory grids keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryGridResolver {
    grids: HashMap<String, Arc<ShiftGrid>>,
}

impl MemoryGridResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, grid: ShiftGrid) -> Result<()> {
        grid.validate()?;
        self.grids.insert(name.into(), Arc::new(grid));
        Ok(())
    }
}

impl GridResolver for MemoryGridResolver {
    fn resolve(&self, name: &str) -> Result<Arc<ShiftGrid>> {
        self.grids
            .get(name)
            .cloned()
            .ok_or_else(|| ProjectionError::GridShift(format!("unknown grid '{}'", name)))
    }
}

/// `+proj=hgridshift`: adds interpolated offsets to lon/lat.
///
/// With several grids the first one containing the point is used. Points
/// covered by no grid are outside the step's domain.
#[derive(Debug, Clone)]
pub struct GridShift {
    grids: Vec<(String, Arc<ShiftGrid>)>,
}

impl GridShift {
    pub fn new(grids: Vec<(String, Arc<ShiftGrid>)>) -> Result<Self> {
        if grids.is_empty() {
            return Err(ProjectionError::invalid("hgridshift", "+grids is empty"));
        }
        Ok(Self { grids })
    }

    /// Resolve a PROJ-style comma separated grid list. Names prefixed with
    /// `@` are optional and skipped when the resolver does not know them.
    pub fn from_names(list: &str, resolver: &dyn GridResolver) -> Result<Self> {
        let mut grids = Vec::new();
        for raw in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, optional) = match raw.strip_prefix('@') {
                Some(name) => (name, true),
                None => (raw, false),
            };
            match resolver.resolve(name) {
                Ok(grid) => grids.push((name.to_string(), grid)),
                Err(e) if optional => {
                    debug!(grid = name, error = %e, "Skipping optional grid");
                }
                Err(e) => return Err(e),
            }
        }
        Self::new(grids)
    }

    pub fn grid_names(&self) -> impl Iterator<Item = &str> {
        self.grids.iter().map(|(name, _)| name.as_str())
    }

    fn offset(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        self.grids.iter().find_map(|(_, g)| g.offset(lon, lat))
    }
}

impl Transform for GridShift {
    fn name(&self) -> &'static str {
        "hgridshift"
    }

    fn forward(&self, c: Coord) -> Coord {
        match self.offset(c.x, c.y) {
            Some((dlon, dlat)) => Coord::new(c.x + dlon, c.y + dlat, c.z),
            None => Coord::invalid(),
        }
    }

    /// Solve `p + shift(p) = c` by fixed-point iteration.
    fn inverse(&self, c: Coord) -> Coord {
        let (mut lon, mut lat) = match self.offset(c.x, c.y) {
            Some((dlon, dlat)) => (c.x - dlon, c.y - dlat),
            None => return Coord::invalid(),
        };
        for _ in 0..MAX_ITERATIONS {
            let Some((dlon, dlat)) = self.offset(lon, lat) else {
                return Coord::invalid();
            };
            let next_lon = c.x - dlon;
            let next_lat = c.y - dlat;
            let converged =
                (next_lon - lon).abs() < TOLERANCE_DEG && (next_lat - lat).abs() < TOLERANCE_DEG;
            lon = next_lon;
            lat = next_lat;
            if converged {
                break;
            }
        }
        Coord::new(lon, lat, c.z)
    }

    fn proj_params(&self) -> Vec<String> {
        vec![format!("grids={}", self.grid_names().collect::<Vec<_>>().join(","))]
    }
}
