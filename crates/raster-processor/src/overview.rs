//! Overview pyramid built from stored blocks.
//!
//! Level `n` is computed from level `n - 1` as read back from the tile
//! store, never from the original source. Every output pixel depends only
//! on stored input, so re-running produces identical blocks.

use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{RasterProcessorError, Result};
use crate::resample::ResamplingKernel;
use crate::store::{BlockKey, LevelInfo, Manifest, RunStatus, TileStore};
use crate::types::{RasterBlock, Window};
use crate::warp::OutputGrid;

/// Each level halves the previous one.
const LEVEL_SCALE: f64 = 2.0;

/// Parameters of an overview build.
#[derive(Debug, Clone)]
pub struct OverviewOptions {
    /// Kernel to use; `None` reuses the kernel of the warp run.
    pub kernel: Option<ResamplingKernel>,
    /// No level whose smaller dimension falls below this is built.
    pub min_dimension: usize,
    pub max_levels: Option<u32>,
    pub threads: Option<usize>,
}

impl Default for OverviewOptions {
    fn default() -> Self {
        Self {
            kernel: None,
            min_dimension: 256,
            max_levels: None,
            threads: None,
        }
    }
}

/// Summary of an overview build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewReport {
    /// Levels built, level 0 excluded.
    pub levels: Vec<LevelInfo>,
    pub blocks_written: usize,
    pub blocks_empty: usize,
}

pub struct OverviewGenerator {
    options: OverviewOptions,
    cancel: CancellationToken,
}

impl OverviewGenerator {
    pub fn new(options: OverviewOptions) -> Self {
        Self {
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Number of levels above level 0 that `build` would produce.
    pub fn level_count(&self, base: &OutputGrid) -> u32 {
        let mut levels = 0;
        loop {
            if self.options.max_levels.is_some_and(|max| levels >= max) {
                break;
            }
            let prev = base.level(levels);
            if prev.block_count() <= 1 {
                break;
            }
            let next = base.level(levels + 1);
            if next.width.min(next.height) < self.options.min_dimension {
                break;
            }
            levels += 1;
        }
        levels
    }

    /// Rebuild every overview level of the pyramid in `store`.
    pub fn build(&self, store: &dyn TileStore) -> Result<OverviewReport> {
        let start = Instant::now();
        let mut manifest = store
            .read_manifest()?
            .ok_or_else(|| RasterProcessorError::InvalidManifest("store has no manifest".into()))?;
        if !manifest.is_complete() {
            warn!("Level 0 is incomplete; overviews will have holes");
        }

        let kernel = self.options.kernel.unwrap_or(manifest.kernel);
        let levels = self.level_count(&manifest.grid);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads.unwrap_or(0))
            .thread_name(|i| format!("overview-{}", i))
            .build()
            .map_err(|e| RasterProcessorError::configuration(format!("thread pool: {}", e)))?;

        info!(levels = levels, kernel = %kernel, "Building overviews");
        manifest.levels.truncate(1);

        let mut report = OverviewReport {
            levels: Vec::new(),
            blocks_written: 0,
            blocks_empty: 0,
        };

        for level in 1..=levels {
            let prev = manifest.level_grid(level - 1);
            let grid = manifest.level_grid(level);
            let blocks = grid.blocks();

            let results: Vec<Result<bool>> = pool.install(|| {
                blocks
                    .par_iter()
                    .map(|&(col, row)| {
                        if self.cancel.is_cancelled() {
                            return Err(RasterProcessorError::Cancelled);
                        }
                        let key = BlockKey::new(level, col as u32, row as u32);
                        let window = grid.block_window(col, row);
                        let block = reduce_block(store, &manifest, &prev, level - 1, window, kernel)?;
                        match block {
                            Some(block) => {
                                let bytes = manifest.codec.encode(&block, manifest.fill())?;
                                store.write_block(&key, &bytes)?;
                                debug!(block = %key, "Overview block written");
                                Ok(true)
                            }
                            None => Ok(false),
                        }
                    })
                    .collect()
            });

            let mut first_error = None;
            for result in results {
                match result {
                    Ok(true) => report.blocks_written += 1,
                    Ok(false) => report.blocks_empty += 1,
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = first_error {
                manifest.status = RunStatus::Incomplete;
                store.write_manifest(&manifest)?;
                return Err(e);
            }

            let info = LevelInfo::from_grid(level, &grid);
            info!(
                level = level,
                width = grid.width,
                height = grid.height,
                resolution = grid.resolution,
                "Overview level done"
            );
            manifest.levels.push(info.clone());
            report.levels.push(info);
            store.write_manifest(&manifest)?;
        }

        info!(
            levels = report.levels.len(),
            written = report.blocks_written,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Overviews finished"
        );
        Ok(report)
    }
}

/// Compute one block of a level from the level below.
fn reduce_block(
    store: &dyn TileStore,
    manifest: &Manifest,
    prev: &OutputGrid,
    prev_level: u32,
    window: Window,
    kernel: ResamplingKernel,
) -> Result<Option<RasterBlock>> {
    let halo = kernel.halo(LEVEL_SCALE) as i64;
    let wanted = Window::new(
        window.col_off * 2 - halo,
        window.row_off * 2 - halo,
        window.width * 2 + 2 * halo as usize,
        window.height * 2 + 2 * halo as usize,
    );
    let Some(read) = wanted.clip(prev.width, prev.height) else {
        return Ok(None);
    };
    let input = read_level(store, manifest, prev, prev_level, &read)?;

    let colour_bands = prev.colour_bands();
    let mut out = RasterBlock::nodata(window.width, window.height, prev.bands);
    let mut pixel = vec![f32::NAN; prev.bands];
    let mut visible = false;

    for r in 0..window.height {
        for c in 0..window.width {
            let x = ((window.col_off + c as i64) * 2 + 1 - read.col_off) as f64;
            let y = ((window.row_off + r as i64) * 2 + 1 - read.row_off) as f64;
            if !kernel.sample(&input, x, y, (LEVEL_SCALE, LEVEL_SCALE), &mut pixel) {
                continue;
            }

            if prev.has_alpha {
                let alpha = pixel[colour_bands].clamp(0.0, 255.0);
                if alpha > 0.0 {
                    let unweight = 255.0 / alpha;
                    for (b, v) in pixel.iter().take(colour_bands).enumerate() {
                        out.set(b, c, r, v * unweight);
                    }
                    visible = true;
                }
                out.set(colour_bands, c, r, alpha);
            } else {
                for (b, v) in pixel.iter().enumerate() {
                    out.set(b, c, r, *v);
                }
                visible = true;
            }
        }
    }

    Ok(visible.then_some(out))
}

/// Assemble a window of a stored level into float samples.
///
/// With an alpha band colour is premultiplied and missing blocks are fully
/// transparent. Without one, missing blocks are NaN, and so are pixels
/// equal to the manifest's nodata byte when one is set.
pub(crate) fn read_level(
    store: &dyn TileStore,
    manifest: &Manifest,
    grid: &OutputGrid,
    level: u32,
    window: &Window,
) -> Result<RasterBlock> {
    let fill = if grid.has_alpha { 0.0 } else { f32::NAN };
    let mut out = RasterBlock::filled(window.width, window.height, grid.bands, fill);
    let bs = grid.block_size as i64;

    for block_row in window.row_off / bs..=(window.row_end() - 1) / bs {
        for block_col in window.col_off / bs..=(window.col_end() - 1) / bs {
            let key = BlockKey::new(level, block_col as u32, block_row as u32);
            let Some(bytes) = store.read_block(&key)? else {
                continue;
            };
            let block_window = grid.block_window(block_col as usize, block_row as usize);
            let mut block = manifest.codec.decode(
                &bytes,
                block_window.width,
                block_window.height,
                grid.bands,
            )?;
            prepare(&mut block, grid, manifest.nodata);
            out.paste_where(
                &block,
                block_window.col_off - window.col_off,
                block_window.row_off - window.row_off,
                |_, _| true,
            );
        }
    }
    Ok(out)
}

/// Premultiply by alpha, or turn an explicit nodata byte into NaN.
fn prepare(block: &mut RasterBlock, grid: &OutputGrid, nodata: Option<u8>) {
    let colour_bands = grid.colour_bands();
    let n = block.band_len();
    if grid.has_alpha {
        let (colour, alpha) = block.data.split_at_mut(colour_bands * n);
        for (i, v) in colour.iter_mut().enumerate() {
            *v *= alpha[i % n] / 255.0;
        }
    } else if let Some(nodata) = nodata {
        let nodata = f32::from(nodata);
        for i in 0..n {
            if (0..colour_bands).all(|b| block.data[b * n + i] == nodata) {
                for b in 0..colour_bands {
                    block.data[b * n + i] = f32::NAN;
                }
            }
        }
    }
}
