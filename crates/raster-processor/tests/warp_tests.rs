//! End-to-end reprojection tests.

use ortho_common::{BoundingBox, GeoTransform, SpatialRef, TileCoord, TileGrid};
use projection::{Coord, CoordinatePipeline, NoGrids};
use raster_processor::{
    BlockKey, DirectoryTileStore, ImageSource, Manifest, MaskRasterizer, MemoryRaster,
    MemoryTileStore, MosaicBuilder, OutputGrid, OutputOptions, OverlapPolicy, OverviewGenerator,
    OverviewOptions, RasterProcessorError, RasterSource, ResamplingKernel, RunStatus, TileCodec,
    TileStore, VectorMask, WarpEngine, WarpOptions,
};
use raster_processor::{read_tile, Background};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use test_utils::{
    assert_approx_eq, checkerboard, constant, ramp, temp_test_dir, write_rectangles_geojson,
    write_world_png,
};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Helpers
// ============================================================================

const TILE: usize = 256;
const DEG_PER_PIXEL: f64 = 0.00001;
const WEST: f64 = 17.1;
const NORTH: f64 = 48.15;

fn lonlat_to_webmerc() -> CoordinatePipeline {
    CoordinatePipeline::parse("+proj=webmerc +ellps=WGS84", &NoGrids).unwrap()
}

fn tile_transform(col: usize, row: usize) -> GeoTransform {
    GeoTransform::north_up(
        WEST + (col * TILE) as f64 * DEG_PER_PIXEL,
        NORTH - (row * TILE) as f64 * DEG_PER_PIXEL,
        DEG_PER_PIXEL,
        DEG_PER_PIXEL,
    )
}

/// Mosaic of 2x2 on-disk RGB tiles; tile `i` (row-major) holds `values[i]`.
fn disk_mosaic(dir: &std::path::Path, values: [f32; 4]) -> Arc<dyn RasterSource> {
    let mut builder = MosaicBuilder::new(SpatialRef::epsg(4326), OverlapPolicy::FirstWins);
    for row in 0..2 {
        for col in 0..2 {
            let value = values[row * 2 + col];
            let path = write_world_png(
                dir,
                &format!("tile_{}_{}", row, col),
                &constant(TILE, TILE, 3, value),
                TILE,
                TILE,
                3,
                &tile_transform(col, row),
            );
            let source = ImageSource::open(&path, SpatialRef::epsg(4326)).unwrap();
            builder.add_source(Arc::new(source));
        }
    }
    Arc::new(builder.build().unwrap())
}

fn raw_options(zoom: u32, kernel: ResamplingKernel) -> WarpOptions {
    WarpOptions {
        kernel,
        threads: Some(4),
        output: OutputOptions {
            compression: TileCodec::Raw,
            nodata: None,
        },
        ..WarpOptions::new(zoom)
    }
}

/// Decoded samples of one stored level-0 block.
fn read_raw(store: &dyn TileStore, col: usize, row: usize) -> Option<Vec<u8>> {
    let key = BlockKey::new(0, col as u32, row as u32);
    store.read_block(&key).unwrap()
}

/// Sample of band `band` at output pixel `(col, row)`; `None` when the block
/// holding it was not stored.
fn pixel(store: &dyn TileStore, grid: &OutputGrid, band: usize, col: usize, row: usize) -> Option<u8> {
    let (bc, br) = (col / grid.block_size, row / grid.block_size);
    let window = grid.block_window(bc, br);
    let bytes = read_raw(store, bc, br)?;
    let n = window.width * window.height;
    let (c, r) = (col - window.col_off as usize, row - window.row_off as usize);
    Some(bytes[band * n + r * window.width + c])
}

/// Output pixel containing ground point `(lon, lat)`.
fn output_pixel(grid: &OutputGrid, lon: f64, lat: f64) -> (usize, usize) {
    let xy = lonlat_to_webmerc().forward(Coord::xy(lon, lat));
    let (col, row) = grid
        .geotransform
        .inverse()
        .unwrap()
        .pixel_to_geo(xy.x, xy.y);
    (col.floor() as usize, row.floor() as usize)
}

/// Memory store whose `write_block` fails for one key.
struct RefusingStore {
    inner: MemoryTileStore,
    refused: BlockKey,
}

/// Memory store that cancels `token` once `limit` blocks have been written.
struct CancellingStore {
    inner: MemoryTileStore,
    token: CancellationToken,
    limit: usize,
    writes: AtomicUsize,
}

impl TileStore for RefusingStore {
    fn write_block(&self, key: &BlockKey, bytes: &[u8]) -> raster_processor::Result<()> {
        if *key == self.refused {
            return Err(RasterProcessorError::io(format!("no space left writing {}", key)));
        }
        self.inner.write_block(key, bytes)
    }

    fn read_block(&self, key: &BlockKey) -> raster_processor::Result<Option<Vec<u8>>> {
        self.inner.read_block(key)
    }

    fn has_block(&self, key: &BlockKey) -> raster_processor::Result<bool> {
        self.inner.has_block(key)
    }

    fn write_manifest(&self, manifest: &Manifest) -> raster_processor::Result<()> {
        self.inner.write_manifest(manifest)
    }

    fn read_manifest(&self) -> raster_processor::Result<Option<Manifest>> {
        self.inner.read_manifest()
    }
}

impl TileStore for CancellingStore {
    fn write_block(&self, key: &BlockKey, bytes: &[u8]) -> raster_processor::Result<()> {
        self.inner.write_block(key, bytes)?;
        if self.writes.fetch_add(1, Ordering::SeqCst) + 1 == self.limit {
            self.token.cancel();
        }
        Ok(())
    }

    fn read_block(&self, key: &BlockKey) -> raster_processor::Result<Option<Vec<u8>>> {
        self.inner.read_block(key)
    }

    fn has_block(&self, key: &BlockKey) -> raster_processor::Result<bool> {
        self.inner.has_block(key)
    }

    fn write_manifest(&self, manifest: &Manifest) -> raster_processor::Result<()> {
        self.inner.write_manifest(manifest)
    }

    fn read_manifest(&self) -> raster_processor::Result<Option<Manifest>> {
        self.inner.read_manifest()
    }
}

// ============================================================================
// 2x2 tiles end to end
// ============================================================================

#[test]
fn test_two_by_two_tiles_end_to_end() {
    let dir = temp_test_dir();
    let mosaic = disk_mosaic(dir.path(), [40.0, 80.0, 120.0, 160.0]);
    assert_eq!((mosaic.width(), mosaic.height()), (2 * TILE, 2 * TILE));

    let out_dir = dir.path().join("out");
    let store = DirectoryTileStore::new(&out_dir, "raw").unwrap();
    let engine = WarpEngine::new(
        mosaic,
        SpatialRef::epsg(3857),
        lonlat_to_webmerc(),
        raw_options(17, ResamplingKernel::Nearest),
    )
    .unwrap();
    let report = engine.run(&store).unwrap();
    assert_eq!(report.status, RunStatus::Complete);
    assert!(report.failed_blocks.is_empty());

    // 256-pixel blocks on web mercator: the grid spans exactly the XYZ
    // tiles covering the corners (lon/lat rectangles are rectangles in web
    // mercator).
    let tiles = TileGrid::default();
    let pipeline = lonlat_to_webmerc();
    let east = WEST + (2 * TILE) as f64 * DEG_PER_PIXEL;
    let south = NORTH - (2 * TILE) as f64 * DEG_PER_PIXEL;
    let lower = pipeline.forward(Coord::xy(WEST, south));
    let upper = pipeline.forward(Coord::xy(east, NORTH));
    let covering = tiles.tiles_covering(&BoundingBox::new(lower.x, lower.y, upper.x, upper.y), 17);
    let (first, last) = (covering[0], covering[covering.len() - 1]);
    let grid = &report.grid;
    assert_eq!(grid.width, (last.x - first.x + 1) as usize * TILE);
    assert_eq!(grid.height, (last.y - first.y + 1) as usize * TILE);
    let corner = tiles.tile_bbox(&first);
    assert_approx_eq!(grid.geotransform.c, corner.min_x, 1e-6);
    assert_approx_eq!(grid.geotransform.f, corner.max_y, 1e-6);

    // Each quadrant shows its tile's value, nothing else appears.
    let quarter = 0.25 * (2 * TILE) as f64 * DEG_PER_PIXEL;
    let expect = [
        (WEST + quarter, NORTH - quarter, 40),
        (east - quarter, NORTH - quarter, 80),
        (WEST + quarter, south + quarter, 120),
        (east - quarter, south + quarter, 160),
    ];
    for (lon, lat, value) in expect {
        let (col, row) = output_pixel(grid, lon, lat);
        for band in 0..3 {
            assert_eq!(pixel(&store, grid, band, col, row), Some(value));
        }
    }
    for (bc, br) in grid.blocks() {
        if let Some(bytes) = read_raw(&store, bc, br) {
            assert!(bytes.iter().all(|b| [0, 40, 80, 120, 160].contains(b)));
        }
    }

    // Files and manifest on disk.
    assert!(out_dir.join("manifest.json").is_file());
    assert!(out_dir.join("0").join("0").join("0.raw").is_file());
    let (_, manifest) = DirectoryTileStore::open(&out_dir).unwrap();
    assert_eq!(manifest.status, RunStatus::Complete);
    assert_eq!(&manifest.grid, grid);

    // Overviews from the stored level.
    let overviews = OverviewGenerator::new(OverviewOptions {
        min_dimension: 64,
        ..OverviewOptions::default()
    })
    .build(&store)
    .unwrap();
    assert!(!overviews.levels.is_empty());
    assert_eq!(overviews.levels[0].width, grid.width.div_ceil(2));
    assert!(out_dir.join("1").join("0").join("0.raw").is_file());
}

// ============================================================================
// Kernels
// ============================================================================

#[test]
fn test_constant_source_constant_output_for_every_kernel() {
    let dir = temp_test_dir();
    let mosaic = disk_mosaic(dir.path(), [100.0; 4]);

    for kernel in [
        ResamplingKernel::Nearest,
        ResamplingKernel::Bilinear,
        ResamplingKernel::Cubic,
        ResamplingKernel::Lanczos,
    ] {
        let store = MemoryTileStore::new();
        let engine = WarpEngine::new(
            mosaic.clone(),
            SpatialRef::epsg(3857),
            lonlat_to_webmerc(),
            raw_options(16, kernel),
        )
        .unwrap();
        let report = engine.run(&store).unwrap();
        assert_eq!(report.status, RunStatus::Complete);
        assert!(report.blocks_written > 0);

        let mut seen = 0usize;
        for key in store.keys() {
            let bytes = store.read_block(&key).unwrap().unwrap();
            assert!(
                bytes.iter().all(|&b| b == 100 || b == 0),
                "{} produced a value other than the constant",
                kernel
            );
            seen += bytes.iter().filter(|&&b| b == 100).count();
        }
        assert!(seen > 0);
    }
}

/// A 3857 source whose pixels coincide with the zoom-17 grid.
fn aligned_source(data: Vec<f32>, width: usize, height: usize) -> Arc<dyn RasterSource> {
    let r = TileGrid::default().resolution(17).unwrap();
    let gt = GeoTransform::north_up(838_000.0 * r, 5_024_000.0 * r, r, r);
    Arc::new(MemoryRaster::new(width, height, 1, data, gt, SpatialRef::epsg(3857)).unwrap())
}

#[test]
fn test_lanczos_ramp_has_no_overshoot() {
    // Resample onto a grid offset from the source by a fraction of a pixel.
    let (w, h) = (200, 40);
    let r = TileGrid::default().resolution(17).unwrap();
    let source = aligned_source(ramp(w, h, 1, 10.0, 0.5), w, h);
    let shift = CoordinatePipeline::parse(
        &format!("+proj=helmert +x={} +y={}", 0.37 * r, -0.21 * r),
        &NoGrids,
    )
    .unwrap();

    let store = MemoryTileStore::new();
    let engine = WarpEngine::new(
        source,
        SpatialRef::epsg(3857),
        shift,
        raw_options(17, ResamplingKernel::Lanczos),
    )
    .unwrap();
    engine.run(&store).unwrap();

    let max = 10.0 + 0.5 * (w - 1) as f32;
    for key in store.keys() {
        for &b in &store.read_block(&key).unwrap().unwrap() {
            if b != 0 {
                assert!(b as f32 >= 10.0 - 0.5 && b as f32 <= max + 0.5, "overshoot: {}", b);
            }
        }
    }
}

#[test]
fn test_lanczos_reproduces_aligned_checkerboard() {
    let (w, h) = (128, 96);
    let data = checkerboard(w, h, 1, 32, 40.0, 200.0);
    let source = aligned_source(data.clone(), w, h);

    let store = MemoryTileStore::new();
    let engine = WarpEngine::new(
        source,
        SpatialRef::epsg(3857),
        CoordinatePipeline::identity(),
        WarpOptions {
            block_size: 64,
            ..raw_options(17, ResamplingKernel::Lanczos)
        },
    )
    .unwrap();
    let report = engine.run(&store).unwrap();
    let grid = &report.grid;
    assert_eq!((grid.width, grid.height), (w, h));

    for row in 0..h {
        for col in 0..w {
            assert_eq!(
                pixel(&store, grid, 0, col, row),
                Some(data[row * w + col] as u8),
                "pixel {},{}",
                col,
                row
            );
        }
    }
}

// ============================================================================
// Alpha
// ============================================================================

#[test]
fn test_alpha_from_vector_mask() {
    let dir = temp_test_dir();
    let mosaic = disk_mosaic(dir.path(), [90.0; 4]);

    // Coverage: the middle half of the mosaic.
    let span = (2 * TILE) as f64 * DEG_PER_PIXEL;
    let rect = (
        WEST + 0.25 * span,
        NORTH - 0.75 * span,
        WEST + 0.75 * span,
        NORTH - 0.25 * span,
    );
    let layer_path = write_rectangles_geojson(dir.path(), "coverage", &[rect]);
    let layer = raster_processor::mask::geojson::read_layer(&layer_path).unwrap();
    let mask = VectorMask::new(SpatialRef::epsg(4326), vec![layer]);
    let alpha = MaskRasterizer::default()
        .rasterize_for(&mask, mosaic.as_ref())
        .unwrap();

    let store = MemoryTileStore::new();
    let engine = WarpEngine::new(
        mosaic,
        SpatialRef::epsg(3857),
        lonlat_to_webmerc(),
        raw_options(17, ResamplingKernel::Lanczos),
    )
    .unwrap()
    .with_mask(Arc::new(alpha))
    .unwrap();
    let report = engine.run(&store).unwrap();
    let grid = &report.grid;
    assert!(grid.has_alpha);
    assert_eq!(grid.bands, 4);

    // Strictly inside: opaque. Outside the coverage but inside the source:
    // transparent.
    let (cx, cy) = output_pixel(grid, WEST + 0.5 * span, NORTH - 0.5 * span);
    assert_eq!(pixel(&store, grid, 3, cx, cy), Some(255));
    assert_eq!(pixel(&store, grid, 0, cx, cy), Some(90));
    let (ox, oy) = output_pixel(grid, WEST + 0.1 * span, NORTH - 0.5 * span);
    assert_eq!(pixel(&store, grid, 3, ox, oy), Some(0));

    // Across the middle row alpha rises once and falls once.
    let alphas: Vec<u8> = (0..grid.width)
        .map(|col| pixel(&store, grid, 3, col, cy).unwrap_or(0))
        .collect();
    let peak = alphas.iter().position(|&a| a == 255).unwrap();
    assert!(alphas[..=peak].windows(2).all(|w| w[0] <= w[1]));
    let last_peak = alphas.iter().rposition(|&a| a == 255).unwrap();
    assert!(alphas[last_peak..].windows(2).all(|w| w[0] >= w[1]));
    assert!(alphas[peak..=last_peak].iter().all(|&a| a == 255));
}

#[test]
fn test_level0_blocks_are_served_as_xyz_tiles() {
    let dir = temp_test_dir();
    let mosaic = disk_mosaic(dir.path(), [90.0; 4]);
    let span = (2 * TILE) as f64 * DEG_PER_PIXEL;
    let rect = (WEST + 0.25 * span, NORTH - 0.75 * span, WEST + 0.75 * span, NORTH - 0.25 * span);
    let layer_path = write_rectangles_geojson(dir.path(), "coverage", &[rect]);
    let layer = raster_processor::mask::geojson::read_layer(&layer_path).unwrap();
    let alpha = MaskRasterizer::default()
        .rasterize_for(&VectorMask::new(SpatialRef::epsg(4326), vec![layer]), mosaic.as_ref())
        .unwrap();

    let store = MemoryTileStore::new();
    let engine = WarpEngine::new(
        mosaic,
        SpatialRef::epsg(3857),
        lonlat_to_webmerc(),
        raw_options(17, ResamplingKernel::Bilinear),
    )
    .unwrap()
    .with_mask(Arc::new(alpha))
    .unwrap();
    assert!(engine.blocks_are_tiles());
    let report = engine.run(&store).unwrap();
    let grid = &report.grid;

    let tiles = TileGrid::default();
    let (x0, y0) = (
        ((grid.geotransform.c + tiles.origin_shift()) / (TILE as f64 * grid.resolution)).round() as u32,
        ((tiles.origin_shift() - grid.geotransform.f) / (TILE as f64 * grid.resolution)).round() as u32,
    );

    let mut served = 0;
    for (bc, br) in grid.blocks() {
        let Some(bytes) = read_raw(&store, bc, br) else {
            continue;
        };
        let coord = TileCoord::new(17, x0 + bc as u32, y0 + br as u32);
        let png = read_tile(&store, coord, Background::Alpha).unwrap();
        let img = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
            .unwrap()
            .to_rgba8();
        assert_eq!(img.dimensions(), (TILE as u32, TILE as u32));

        // The tile's alpha is the stored block's alpha band, pixel for pixel.
        let n = TILE * TILE;
        for (i, p) in img.pixels().enumerate() {
            assert_eq!(p.0[3], bytes[3 * n + i], "tile {} pixel {}", coord, i);
        }
        served += 1;
    }
    assert_eq!(served, report.blocks_written);

    // The coverage centre is opaque in its tile.
    let (cx, cy) = output_pixel(grid, WEST + 0.5 * span, NORTH - 0.5 * span);
    let coord = TileCoord::new(17, x0 + (cx / TILE) as u32, y0 + (cy / TILE) as u32);
    let png = read_tile(&store, coord, Background::Alpha).unwrap();
    let img = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
        .unwrap()
        .to_rgba8();
    assert_eq!(img.get_pixel((cx % TILE) as u32, (cy % TILE) as u32).0, [90, 90, 90, 255]);
}

// ============================================================================
// Cancellation and resume
// ============================================================================

#[test]
fn test_cancelled_run_then_resume_completes() {
    let dir = temp_test_dir();
    let mosaic = disk_mosaic(dir.path(), [60.0; 4]);
    let store = DirectoryTileStore::new(dir.path().join("out"), "raw").unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let cancelled = WarpEngine::new(
        mosaic.clone(),
        SpatialRef::epsg(3857),
        lonlat_to_webmerc(),
        raw_options(17, ResamplingKernel::Bilinear),
    )
    .unwrap()
    .with_cancellation(token)
    .run(&store)
    .unwrap();
    assert_eq!(cancelled.status, RunStatus::Incomplete);
    assert_eq!(
        store.read_manifest().unwrap().unwrap().status,
        RunStatus::Incomplete
    );

    let resumed = WarpEngine::new(
        mosaic,
        SpatialRef::epsg(3857),
        lonlat_to_webmerc(),
        WarpOptions {
            resume: true,
            ..raw_options(17, ResamplingKernel::Bilinear)
        },
    )
    .unwrap()
    .run(&store)
    .unwrap();
    assert_eq!(resumed.status, RunStatus::Complete);
    assert_eq!(resumed.blocks_skipped, 0);
    assert_eq!(resumed.blocks_written + resumed.blocks_empty, resumed.blocks_total);
    assert!(store.read_manifest().unwrap().unwrap().is_complete());
}

#[test]
fn test_resume_fills_missing_blocks() {
    let dir = temp_test_dir();
    let mosaic = disk_mosaic(dir.path(), [10.0, 20.0, 30.0, 40.0]);
    let store = MemoryTileStore::new();
    let options = raw_options(17, ResamplingKernel::Cubic);

    let first = WarpEngine::new(
        mosaic.clone(),
        SpatialRef::epsg(3857),
        lonlat_to_webmerc(),
        options.clone(),
    )
    .unwrap()
    .run(&store)
    .unwrap();
    let keys = store.keys();
    assert_eq!(keys.len(), first.blocks_written);

    let removed = keys[keys.len() / 2];
    let original = store.read_block(&removed).unwrap().unwrap();
    store.remove_block(&removed).unwrap();

    let second = WarpEngine::new(
        mosaic,
        SpatialRef::epsg(3857),
        lonlat_to_webmerc(),
        WarpOptions {
            resume: true,
            ..options
        },
    )
    .unwrap()
    .run(&store)
    .unwrap();
    assert_eq!(second.blocks_written, 1);
    assert_eq!(second.blocks_skipped, keys.len() - 1);
    assert_eq!(store.read_block(&removed).unwrap().unwrap(), original);
}

#[test]
fn test_resume_rejects_other_grid() {
    let dir = temp_test_dir();
    let mosaic = disk_mosaic(dir.path(), [10.0; 4]);
    let store = MemoryTileStore::new();

    WarpEngine::new(
        mosaic.clone(),
        SpatialRef::epsg(3857),
        lonlat_to_webmerc(),
        raw_options(17, ResamplingKernel::Nearest),
    )
    .unwrap()
    .run(&store)
    .unwrap();

    let result = WarpEngine::new(
        mosaic,
        SpatialRef::epsg(3857),
        lonlat_to_webmerc(),
        WarpOptions {
            resume: true,
            ..raw_options(16, ResamplingKernel::Nearest)
        },
    )
    .unwrap()
    .run(&store);
    assert!(result.is_err());
}

// ============================================================================
// Store failures
// ============================================================================

#[test]
fn test_failed_write_is_reported_and_others_are_kept() {
    let dir = temp_test_dir();
    let mosaic = disk_mosaic(dir.path(), [70.0; 4]);
    let options = WarpOptions {
        block_size: 64,
        ..raw_options(17, ResamplingKernel::Bilinear)
    };

    let reference = MemoryTileStore::new();
    let full = WarpEngine::new(
        mosaic.clone(),
        SpatialRef::epsg(3857),
        lonlat_to_webmerc(),
        options.clone(),
    )
    .unwrap()
    .run(&reference)
    .unwrap();
    let keys = reference.keys();
    let refused = keys[keys.len() / 2];

    let store = RefusingStore {
        inner: MemoryTileStore::new(),
        refused,
    };
    let report = WarpEngine::new(mosaic, SpatialRef::epsg(3857), lonlat_to_webmerc(), options)
        .unwrap()
        .run(&store)
        .unwrap();

    assert_eq!(report.status, RunStatus::Incomplete);
    assert_eq!(report.failed_blocks, vec![refused]);
    assert_eq!(report.blocks_written, full.blocks_written - 1);
    let written = store.inner.keys();
    assert!(!written.contains(&refused));
    assert_eq!(written.len(), keys.len() - 1);
    for key in &written {
        assert_eq!(store.inner.read_block(key).unwrap(), reference.read_block(key).unwrap());
    }

    let manifest = store.read_manifest().unwrap().unwrap();
    assert_eq!(manifest.status, RunStatus::Incomplete);
    assert_eq!(manifest.failed_blocks, vec![refused]);
}

#[test]
fn test_cancel_mid_run_finishes_in_flight_blocks() {
    let dir = temp_test_dir();
    let mosaic = disk_mosaic(dir.path(), [70.0; 4]);
    let token = CancellationToken::new();
    let store = CancellingStore {
        inner: MemoryTileStore::new(),
        token: token.clone(),
        limit: 3,
        writes: AtomicUsize::new(0),
    };

    let report = WarpEngine::new(
        mosaic,
        SpatialRef::epsg(3857),
        lonlat_to_webmerc(),
        WarpOptions {
            block_size: 32,
            threads: Some(2),
            ..raw_options(17, ResamplingKernel::Bilinear)
        },
    )
    .unwrap()
    .with_cancellation(token)
    .run(&store)
    .unwrap();

    assert_eq!(report.status, RunStatus::Incomplete);
    assert!(report.blocks_cancelled > 0);
    assert!(report.blocks_written >= 3);
    assert!(report.failed_blocks.is_empty());
    // Every started block ran to completion and nothing was half written.
    assert_eq!(store.inner.len(), report.blocks_written);
    assert_eq!(
        report.blocks_written + report.blocks_empty + report.blocks_cancelled,
        report.blocks_total
    );
    assert_eq!(
        store.read_manifest().unwrap().unwrap().status,
        RunStatus::Incomplete
    );
}
