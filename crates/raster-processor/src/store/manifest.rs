//! Run manifest stored next to the blocks.

use serde::{Deserialize, Serialize};

use super::codec::TileCodec;
use super::BlockKey;
use crate::resample::ResamplingKernel;
use crate::warp::grid::OutputGrid;

/// Current manifest layout version.
pub const MANIFEST_VERSION: u32 = 1;

/// Whether a run covered every block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every block of every level was written (or is legitimately empty).
    Complete,
    /// The run was cancelled, is still in progress or had failed blocks.
    Incomplete,
}

/// One pyramid level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub level: u32,
    pub width: usize,
    pub height: usize,
    pub resolution: f64,
}

impl LevelInfo {
    pub fn from_grid(level: u32, grid: &OutputGrid) -> Self {
        Self {
            level,
            width: grid.width,
            height: grid.height,
            resolution: grid.resolution,
        }
    }
}

/// Describes the output of a run: grid, encoding and completeness.
///
/// Consumers must treat `status: incomplete` output as partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    /// Grid of level 0.
    pub grid: OutputGrid,
    pub kernel: ResamplingKernel,
    pub codec: TileCodec,
    /// Byte marking nodata pixels when there is no alpha band; unset, every
    /// pixel of an alpha-less grid is valid.
    #[serde(default)]
    pub nodata: Option<u8>,
    pub levels: Vec<LevelInfo>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_blocks: Vec<BlockKey>,
}

impl Manifest {
    pub fn new(
        grid: OutputGrid,
        kernel: ResamplingKernel,
        codec: TileCodec,
        nodata: Option<u8>,
    ) -> Self {
        let levels = vec![LevelInfo::from_grid(0, &grid)];
        Self {
            format_version: MANIFEST_VERSION,
            grid,
            kernel,
            codec,
            nodata,
            levels,
            status: RunStatus::Incomplete,
            failed_blocks: Vec::new(),
        }
    }

    /// Byte written for nodata pixels.
    pub fn fill(&self) -> u8 {
        self.nodata.unwrap_or(0)
    }

    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Complete
    }

    /// Grid of pyramid level `level`.
    pub fn level_grid(&self, level: u32) -> OutputGrid {
        self.grid.level(level)
    }
}
