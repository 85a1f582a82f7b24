//! Block-wise reprojection onto a zoom-level grid.
//!
//! The engine computes the target grid from the transformed source extent,
//! partitions it into blocks and resamples each block independently on a
//! rayon pool. Only the source window a block needs (plus the kernel halo)
//! is ever read.

pub mod grid;
pub mod planner;

pub use grid::OutputGrid;
pub use planner::{transformed_extent, BlockPlan, PixelMapper};

use ortho_common::{SpatialRef, SrsCode, TileGrid};
use projection::{Coord, CoordinatePipeline};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RasterProcessorConfig;
use crate::error::{RasterProcessorError, Result};
use crate::resample::ResamplingKernel;
use crate::source::RasterSource;
use crate::store::{BlockKey, Manifest, RunStatus, TileCodec, TileStore};
use crate::types::{RasterBlock, Window};

/// Largest allowed mismatch of the pipeline round trip, in source pixels.
const ROUND_TRIP_TOLERANCE: f64 = 0.01;

/// How output blocks are stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    pub compression: TileCodec,
    /// Byte marking nodata pixels when there is no alpha band.
    ///
    /// Unset, nodata pixels are written as 0 and read back as ordinary
    /// black pixels. Lossy codecs cannot keep an exact value, so JPEG
    /// output refuses a nodata byte.
    pub nodata: Option<u8>,
}

impl OutputOptions {
    /// Byte written for nodata pixels.
    pub fn fill(&self) -> u8 {
        self.nodata.unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        if let (TileCodec::Jpeg { .. }, Some(nodata)) = (self.compression, self.nodata) {
            return Err(RasterProcessorError::configuration(format!(
                "JPEG output cannot preserve nodata value {}; use PNG or deflate, or a mask",
                nodata
            )));
        }
        Ok(())
    }
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            compression: TileCodec::Png,
            nodata: None,
        }
    }
}

/// Parameters of a warp run.
#[derive(Debug, Clone)]
pub struct WarpOptions {
    pub zoom: u32,
    pub tile_grid: TileGrid,
    pub kernel: ResamplingKernel,
    /// Snap the output grid to integer multiples of the resolution.
    pub target_aligned: bool,
    /// Worker threads; `None` uses every core.
    pub threads: Option<usize>,
    pub block_size: usize,
    pub edge_samples: usize,
    pub mask_resampling: ResamplingKernel,
    /// Skip blocks already present in the store.
    pub resume: bool,
    pub output: OutputOptions,
}

impl WarpOptions {
    pub fn new(zoom: u32) -> Self {
        Self::from_config(zoom, &RasterProcessorConfig::default())
    }

    /// Options for `zoom` taking block size, edge sampling and mask
    /// resampling from `config`.
    pub fn from_config(zoom: u32, config: &RasterProcessorConfig) -> Self {
        Self {
            zoom,
            tile_grid: TileGrid::default(),
            kernel: ResamplingKernel::default(),
            target_aligned: true,
            threads: None,
            block_size: config.block_size,
            edge_samples: config.edge_samples,
            mask_resampling: config.mask_resampling,
            resume: false,
            output: OutputOptions::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.tile_grid
            .resolution(self.zoom)
            .map_err(|e| RasterProcessorError::configuration(e.to_string()))?;
        if self.block_size == 0 {
            return Err(RasterProcessorError::configuration("block_size must be > 0"));
        }
        if self.edge_samples < 2 {
            return Err(RasterProcessorError::configuration(
                "edge_samples must be >= 2 (corners)",
            ));
        }
        if !matches!(
            self.mask_resampling,
            ResamplingKernel::Nearest | ResamplingKernel::Bilinear
        ) {
            return Err(RasterProcessorError::configuration(format!(
                "mask resampling must be nearest or bilinear, got {}",
                self.mask_resampling
            )));
        }
        if self.threads == Some(0) {
            return Err(RasterProcessorError::configuration("threads must be > 0"));
        }
        self.output.validate()
    }
}

/// Summary of a warp run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarpReport {
    pub grid: OutputGrid,
    pub blocks_total: usize,
    pub blocks_written: usize,
    /// Blocks already present in the store (resume).
    pub blocks_skipped: usize,
    /// Blocks with no visible pixel; nothing is stored for them.
    pub blocks_empty: usize,
    /// Blocks not started because the run was cancelled.
    pub blocks_cancelled: usize,
    pub failed_blocks: Vec<BlockKey>,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockOutcome {
    Written,
    Skipped,
    Empty,
    Cancelled,
    Failed,
}

/// Reprojects a raster (and optionally its alpha mask) into a tile store.
pub struct WarpEngine {
    source: Arc<dyn RasterSource>,
    mask: Option<Arc<dyn RasterSource>>,
    target_srs: SpatialRef,
    pipeline: Arc<CoordinatePipeline>,
    options: WarpOptions,
    cancel: CancellationToken,
}

impl WarpEngine {
    /// Create an engine; every configuration check happens here.
    ///
    /// `pipeline` maps source ground coordinates to target ground
    /// coordinates.
    pub fn new(
        source: Arc<dyn RasterSource>,
        target_srs: SpatialRef,
        pipeline: CoordinatePipeline,
        options: WarpOptions,
    ) -> Result<Self> {
        options.validate()?;
        options
            .output
            .compression
            .validate(source.bands(), false)?;
        check_round_trip(source.as_ref(), &pipeline)?;

        Ok(Self {
            source,
            mask: None,
            target_srs,
            pipeline: Arc::new(pipeline),
            options,
            cancel: CancellationToken::new(),
        })
    }

    /// Attach an alpha mask on the source pixel grid.
    pub fn with_mask(mut self, mask: Arc<dyn RasterSource>) -> Result<Self> {
        if mask.bands() != 1 {
            return Err(RasterProcessorError::configuration(format!(
                "mask must have 1 band, got {}",
                mask.bands()
            )));
        }
        if mask.srs() != self.source.srs() {
            return Err(RasterProcessorError::configuration(format!(
                "mask SRS {} differs from source SRS {}",
                mask.srs(),
                self.source.srs()
            )));
        }
        let same_grid = mask.width() == self.source.width()
            && mask.height() == self.source.height()
            && mask
                .geotransform()
                .to_gdal()
                .iter()
                .zip(self.source.geotransform().to_gdal())
                .all(|(a, b)| (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0));
        if !same_grid {
            return Err(RasterProcessorError::configuration(
                "mask pixel grid differs from the source pixel grid",
            ));
        }
        self.options
            .output
            .compression
            .validate(self.source.bands() + 1, true)?;
        self.mask = Some(mask);
        Ok(self)
    }

    /// Use `token` to stop the run; blocks in flight still finish.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &WarpOptions {
        &self.options
    }

    /// True when level-0 blocks coincide with the XYZ tiles of the zoom
    /// level: a target-aligned web mercator grid with tile-sized blocks.
    pub fn blocks_are_tiles(&self) -> bool {
        self.options.target_aligned
            && self.options.block_size == self.options.tile_grid.tile_size as usize
            && self.target_srs.code() == &SrsCode::WEB_MERCATOR
    }

    /// Compute the output grid without touching any pixel.
    ///
    /// When [`blocks_are_tiles`](Self::blocks_are_tiles) holds, the origin
    /// is the corner of the first covering tile and the grid spans whole
    /// tiles, so block `(col, row)` is tile `(x0 + col, y0 + row)`.
    pub fn plan(&self) -> Result<OutputGrid> {
        let extent = transformed_extent(
            self.source.as_ref(),
            &self.pipeline,
            self.options.edge_samples,
        )?;
        let r = self
            .options
            .tile_grid
            .resolution(self.options.zoom)
            .map_err(|e| RasterProcessorError::configuration(e.to_string()))?;

        let (geotransform, width, height) = if self.blocks_are_tiles() {
            let tile_grid = &self.options.tile_grid;
            let tiles = tile_grid.tiles_covering(&extent, self.options.zoom);
            let (Some(first), Some(last)) = (tiles.first(), tiles.last()) else {
                return Err(RasterProcessorError::configuration(
                    "source extent covers no tile of the zoom level",
                ));
            };
            let corner = tile_grid.tile_bbox(first);
            let size = tile_grid.tile_size as usize;
            (
                ortho_common::GeoTransform::north_up(corner.min_x, corner.max_y, r, r),
                (last.x - first.x + 1) as usize * size,
                (last.y - first.y + 1) as usize * size,
            )
        } else if self.options.target_aligned {
            let (_, [ix_min, iy_min, ix_max, iy_max]) = extent.snap_outward(r);
            (
                ortho_common::GeoTransform::north_up(ix_min as f64 * r, iy_max as f64 * r, r, r),
                (ix_max - ix_min).max(1) as usize,
                (iy_max - iy_min).max(1) as usize,
            )
        } else {
            (
                ortho_common::GeoTransform::north_up(extent.min_x, extent.max_y, r, r),
                ((extent.width() / r).ceil() as usize).max(1),
                ((extent.height() / r).ceil() as usize).max(1),
            )
        };

        let has_alpha = self.mask.is_some();
        let grid = OutputGrid {
            srs: self.target_srs.clone(),
            geotransform,
            width,
            height,
            bands: self.source.bands() + usize::from(has_alpha),
            has_alpha,
            block_size: self.options.block_size,
            resolution: r,
            zoom: self.options.zoom,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Resample one output block; `None` when no pixel of it is visible.
    pub fn warp_block(
        &self,
        grid: &OutputGrid,
        mapper: &PixelMapper<'_>,
        window: Window,
    ) -> Result<Option<RasterBlock>> {
        let kernel = self.options.kernel;
        let mask_kernel = self.options.mask_resampling;
        let halo_for = |s: f64| kernel.halo(s).max(mask_kernel.halo(s));
        let Some(plan) = mapper.plan(window, self.options.edge_samples, halo_for) else {
            return Ok(None);
        };

        let (w, h) = (window.width, window.height);
        let mut coords = Vec::with_capacity(w * h);
        let mut lo = (f64::INFINITY, f64::INFINITY);
        let mut hi = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for r in 0..h {
            for c in 0..w {
                let p = mapper.source_pixel(
                    (window.col_off + c as i64) as f64 + 0.5,
                    (window.row_off + r as i64) as f64 + 0.5,
                );
                if let Some((x, y)) = p {
                    lo = (lo.0.min(x), lo.1.min(y));
                    hi = (hi.0.max(x), hi.1.max(y));
                }
                coords.push(p);
            }
        }
        if !lo.0.is_finite() {
            return Ok(None);
        }

        // Pixel centres can fall outside the densified boundary on strongly
        // curved mappings; read enough to cover every one of them.
        let halo = halo_for(plan.scale.0).max(halo_for(plan.scale.1)) as i64;
        let src = plan.source_window;
        let c0 = src.col_off.min(lo.0.floor() as i64 - halo);
        let r0 = src.row_off.min(lo.1.floor() as i64 - halo);
        let c1 = src.col_end().max(hi.0.ceil() as i64 + halo);
        let r1 = src.row_end().max(hi.1.ceil() as i64 + halo);
        let Some(read) = Window::new(c0, r0, (c1 - c0) as usize, (r1 - r0) as usize)
            .clip(self.source.width(), self.source.height())
        else {
            return Ok(None);
        };

        let source_block = self.source.read_window(&read)?;
        let mask_block = match &self.mask {
            Some(mask) => Some(mask.read_window(&read)?),
            None => None,
        };

        let colour_bands = grid.colour_bands();
        let mut out = RasterBlock::nodata(w, h, grid.bands);
        let mut pixel = vec![f32::NAN; colour_bands];
        let mut alpha = [f32::NAN];
        let mut visible = false;

        for (i, p) in coords.iter().enumerate() {
            let (c, r) = (i % w, i / w);
            let (valid, x, y) = match *p {
                Some((x, y)) => {
                    let x = x - read.col_off as f64;
                    let y = y - read.row_off as f64;
                    (kernel.sample(&source_block, x, y, plan.scale, &mut pixel), x, y)
                }
                None => (false, f64::NAN, f64::NAN),
            };

            if valid {
                for (b, v) in pixel.iter().enumerate() {
                    out.set(b, c, r, *v);
                }
            }

            match &mask_block {
                Some(mask) => {
                    let a = if valid && mask_kernel.sample(mask, x, y, plan.scale, &mut alpha) {
                        alpha[0].clamp(0.0, 255.0)
                    } else {
                        0.0
                    };
                    out.set(colour_bands, c, r, a);
                    visible |= a > 0.0;
                }
                None => visible |= valid,
            }
        }

        Ok(visible.then_some(out))
    }

    /// Warp the whole grid into `store` as level 0.
    pub fn run(&self, store: &dyn TileStore) -> Result<WarpReport> {
        let start = Instant::now();
        let grid = self.plan()?;
        let output = self.options.output;

        if self.options.resume {
            if let Some(existing) = store.read_manifest()? {
                if !existing.grid.same_pixels(&grid) || existing.codec != output.compression {
                    return Err(RasterProcessorError::configuration(
                        "cannot resume: the store was written for a different grid or codec",
                    ));
                }
            }
        }

        let mut manifest =
            Manifest::new(grid.clone(), self.options.kernel, output.compression, output.nodata);
        store.write_manifest(&manifest)?;

        let mapper = PixelMapper::new(&self.pipeline, grid.geotransform, self.source.as_ref())?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads.unwrap_or(0))
            .thread_name(|i| format!("warp-{}", i))
            .build()
            .map_err(|e| RasterProcessorError::configuration(format!("thread pool: {}", e)))?;

        let blocks = grid.blocks();
        info!(
            width = grid.width,
            height = grid.height,
            bands = grid.bands,
            zoom = grid.zoom,
            resolution = grid.resolution,
            blocks = blocks.len(),
            kernel = %self.options.kernel,
            threads = pool.current_num_threads(),
            "Starting warp"
        );

        let outcomes: Vec<(BlockKey, BlockOutcome)> = pool.install(|| {
            blocks
                .par_iter()
                .map(|&(col, row)| {
                    let key = BlockKey::new(0, col as u32, row as u32);
                    let window = grid.block_window(col, row);
                    (key, self.process_block(store, &grid, &mapper, key, window))
                })
                .collect()
        });

        let count = |o: BlockOutcome| outcomes.iter().filter(|(_, x)| *x == o).count();
        let failed_blocks: Vec<BlockKey> = outcomes
            .iter()
            .filter(|(_, o)| *o == BlockOutcome::Failed)
            .map(|(k, _)| *k)
            .collect();
        let blocks_cancelled = count(BlockOutcome::Cancelled);

        let status = if failed_blocks.is_empty() && blocks_cancelled == 0 {
            RunStatus::Complete
        } else {
            RunStatus::Incomplete
        };
        manifest.status = status;
        manifest.failed_blocks = failed_blocks.clone();
        store.write_manifest(&manifest)?;

        let report = WarpReport {
            grid,
            blocks_total: blocks.len(),
            blocks_written: count(BlockOutcome::Written),
            blocks_skipped: count(BlockOutcome::Skipped),
            blocks_empty: count(BlockOutcome::Empty),
            blocks_cancelled,
            failed_blocks,
            status,
        };

        if blocks_cancelled > 0 {
            warn!(
                cancelled = blocks_cancelled,
                written = report.blocks_written,
                "Warp cancelled, output is incomplete"
            );
        }
        info!(
            written = report.blocks_written,
            skipped = report.blocks_skipped,
            empty = report.blocks_empty,
            failed = report.failed_blocks.len(),
            status = ?status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Warp finished"
        );
        Ok(report)
    }

    fn process_block(
        &self,
        store: &dyn TileStore,
        grid: &OutputGrid,
        mapper: &PixelMapper<'_>,
        key: BlockKey,
        window: Window,
    ) -> BlockOutcome {
        if self.cancel.is_cancelled() {
            return BlockOutcome::Cancelled;
        }

        let result = (|| -> Result<BlockOutcome> {
            if self.options.resume && store.has_block(&key)? {
                return Ok(BlockOutcome::Skipped);
            }
            let Some(block) = self.warp_block(grid, mapper, window)? else {
                return Ok(BlockOutcome::Empty);
            };
            let bytes = self
                .options
                .output
                .compression
                .encode(&block, self.options.output.fill())?;
            store.write_block(&key, &bytes)?;
            Ok(BlockOutcome::Written)
        })();

        match result {
            Ok(outcome) => {
                debug!(block = %key, outcome = ?outcome, "Block done");
                outcome
            }
            Err(e) => {
                warn!(block = %key, error = %e, "Block failed");
                BlockOutcome::Failed
            }
        }
    }
}

/// Reject pipelines whose inverse does not undo the forward direction at
/// the source centre.
fn check_round_trip(source: &dyn RasterSource, pipeline: &CoordinatePipeline) -> Result<()> {
    let gt = source.geotransform();
    let (col, row) = (source.width() as f64 / 2.0, source.height() as f64 / 2.0);
    let (x, y) = gt.pixel_to_geo(col, row);
    let forward = pipeline.forward(Coord::xy(x, y));
    if !forward.is_valid() {
        return Err(RasterProcessorError::configuration(
            "pipeline cannot transform the source centre",
        ));
    }

    let back = pipeline.inverse(forward);
    let inverse = gt
        .inverse()
        .map_err(|e| RasterProcessorError::configuration(format!("source geotransform: {}", e)))?;
    let (bc, br) = inverse.pixel_to_geo(back.x, back.y);
    let error = (bc - col).hypot(br - row);
    if !error.is_finite() || error > ROUND_TRIP_TOLERANCE {
        return Err(RasterProcessorError::configuration(format!(
            "pipeline round trip misses the source centre by {:.4} pixels",
            error
        )));
    }
    Ok(())
}
