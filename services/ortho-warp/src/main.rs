//! Orthophoto reprojection and tiling service.
//!
//! Runs a job end to end:
//! - Mosaics the source images (world-file georeferenced)
//! - Burns the GeoJSON coverage layers into an alpha mask
//! - Reprojects block by block onto a zoom-level grid
//! - Builds the overview pyramid from the stored blocks
//! - Cuts z/x/y tiles out of a finished store
//!
//! Ctrl-C cancels the run; blocks already written are kept and a later
//! `run --resume` fills in the rest.

mod config;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{load_job_config, JobConfig};
use ortho_common::TileCoord;
use raster_processor::mask::geojson::read_layer;
use raster_processor::{
    read_tile, Background, DirectoryTileStore, ImageSource, MaskRasterizer, Mosaic, MosaicBuilder, OverviewGenerator,
    OverviewOptions, RasterSource, RunStatus, VectorMask, WarpEngine,
};

#[derive(Parser)]
#[command(name = "ortho-warp")]
#[command(about = "Reproject orthophoto mosaics into tiled zoom-level grids", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Warp a job into its output store and build overviews
    Run {
        /// Path to the job YAML file
        #[arg(short, long)]
        job: PathBuf,

        /// Override the worker thread count
        #[arg(long)]
        threads: Option<usize>,

        /// Skip blocks already present in the output store
        #[arg(long)]
        resume: bool,

        /// Log level (trace, debug, info, warn, error)
        #[arg(long, env = "LOG_LEVEL", default_value = "info")]
        log_level: String,

        /// Emit logs as JSON
        #[arg(long)]
        json_logs: bool,
    },

    /// Rebuild the overview pyramid of an existing store
    Overviews {
        /// Output store directory (contains manifest.json)
        #[arg(short, long)]
        store: PathBuf,

        /// Smallest level dimension to build
        #[arg(long, default_value = "256")]
        min_dimension: usize,

        /// Override the worker thread count
        #[arg(long)]
        threads: Option<usize>,

        /// Log level (trace, debug, info, warn, error)
        #[arg(long, env = "LOG_LEVEL", default_value = "info")]
        log_level: String,
    },

    /// Cut one z/x/y tile out of an existing store
    Tile {
        /// Output store directory (contains manifest.json)
        #[arg(short, long)]
        store: PathBuf,

        /// Tile as z/x/y
        tile: TileCoord,

        /// `alpha` for a transparent PNG, or an `r,g,b` colour for a JPEG
        #[arg(long, default_value = "alpha")]
        background: Background,

        /// Where to write the tile; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Log level (trace, debug, info, warn, error)
        #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
        log_level: String,
    },

    /// Print the target grid of a job without warping any pixels
    Extent {
        /// Path to the job YAML file
        #[arg(short, long)]
        job: PathBuf,

        /// Log level (trace, debug, info, warn, error)
        #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
        log_level: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            job,
            threads,
            resume,
            log_level,
            json_logs,
        } => {
            init_tracing(&log_level, json_logs)?;
            run_job(&job, threads, resume)
        }
        Commands::Overviews {
            store,
            min_dimension,
            threads,
            log_level,
        } => {
            init_tracing(&log_level, false)?;
            rebuild_overviews(&store, min_dimension, threads)
        }
        Commands::Tile {
            store,
            tile,
            background,
            output,
            log_level,
        } => {
            init_tracing(&log_level, false)?;
            write_tile(&store, tile, background, output.as_deref())
        }
        Commands::Extent { job, log_level } => {
            init_tracing(&log_level, false)?;
            print_extent(&job)
        }
    }
}

fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// `RUST_LOG` wins over `--log-level` when set.
fn log_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(parse_level(log_level)).into())
    })
}

/// Logs go to stderr so reports on stdout stay machine-readable.
fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_env_filter(log_filter(log_level))
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Cancel `token` on Ctrl-C.
fn install_interrupt_handler(token: CancellationToken) -> Result<()> {
    ctrlc::set_handler(move || {
        warn!("Interrupt received, cancelling after in-flight blocks");
        token.cancel();
    })
    .context("Failed to install Ctrl-C handler")
}

// ============================================================================
// Job stages
// ============================================================================

fn open_mosaic(job: &JobConfig) -> Result<Arc<Mosaic>> {
    let srs = job.source_srs()?;
    let paths = job.source_paths()?;
    info!(sources = paths.len(), srs = %srs, "Opening source images");

    let mut builder = MosaicBuilder::new(srs.clone(), job.overlap)
        .with_cache_size(job.raster_config().cache_size_bytes());
    for path in &paths {
        let mut source = ImageSource::open(path, srs.clone())
            .with_context(|| format!("Failed to open source {:?}", path))?;
        if let Some(nodata) = job.source_nodata {
            source = source.with_nodata(nodata);
        }
        builder.add_source(Arc::new(source));
    }
    Ok(Arc::new(builder.build().context("Failed to build mosaic")?))
}

fn build_engine(
    job: &JobConfig,
    source: Arc<dyn RasterSource>,
    resume: bool,
) -> Result<WarpEngine> {
    let mut options = job.warp_options();
    options.resume = resume;
    let engine = WarpEngine::new(source, job.target_srs()?, job.pipeline()?, options)
        .context("Invalid warp configuration")?;
    Ok(engine)
}

fn attach_mask(job: &JobConfig, engine: WarpEngine, source: &dyn RasterSource) -> Result<WarpEngine> {
    let Some(mask) = &job.mask else {
        return Ok(engine);
    };

    let layers = mask
        .layers
        .iter()
        .map(|path| {
            let path = job.resolve(path);
            read_layer(&path).with_context(|| format!("Failed to read mask layer {:?}", path))
        })
        .collect::<Result<Vec<_>>>()?;
    info!(layers = layers.len(), invert = mask.invert, "Rasterizing coverage mask");

    let vector = VectorMask::new(job.source_srs()?, layers);
    let alpha = MaskRasterizer::new(job.mask_options())
        .rasterize_for(&vector, source)
        .context("Failed to rasterize coverage mask")?;
    engine
        .with_mask(Arc::new(alpha))
        .context("Mask does not match the source grid")
}

fn run_job(path: &Path, threads: Option<usize>, resume: bool) -> Result<()> {
    let mut job = load_job_config(path)?;
    if threads.is_some() {
        job.threads = threads;
        job.validate()?;
    }

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone())?;

    let mosaic = open_mosaic(&job)?;
    let source: Arc<dyn RasterSource> = mosaic.clone();

    let mut engine = build_engine(&job, source.clone(), resume)?;
    engine = attach_mask(&job, engine, source.as_ref())?;
    let engine = engine.with_cancellation(cancel.clone());

    let codec = job.output.compression;
    let store = DirectoryTileStore::new(job.output_dir(), codec.extension())
        .context("Failed to open output store")?;

    let report = engine.run(&store)?;

    let cache = mosaic.cache_stats();
    info!(
        cache_hits = cache.hits,
        cache_misses = cache.misses,
        "Source cache usage"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.status != RunStatus::Complete {
        anyhow::bail!(
            "Run incomplete: {} failed and {} cancelled blocks; rerun with --resume",
            report.failed_blocks.len(),
            report.blocks_cancelled
        );
    }

    if job.overviews.enabled {
        let overviews = OverviewGenerator::new(job.overview_options())
            .with_cancellation(cancel)
            .build(&store)
            .context("Failed to build overviews")?;
        println!("{}", serde_json::to_string_pretty(&overviews)?);
    }

    Ok(())
}

fn rebuild_overviews(root: &Path, min_dimension: usize, threads: Option<usize>) -> Result<()> {
    anyhow::ensure!(threads != Some(0), "threads must be greater than 0");
    let (store, manifest) = DirectoryTileStore::open(root)
        .with_context(|| format!("Failed to open store {:?}", root))?;
    info!(
        store = %root.display(),
        levels = manifest.levels.len(),
        "Rebuilding overviews"
    );

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone())?;

    let options = OverviewOptions {
        min_dimension,
        threads,
        ..OverviewOptions::default()
    };
    let report = OverviewGenerator::new(options)
        .with_cancellation(cancel)
        .build(&store)
        .context("Failed to build overviews")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn write_tile(
    root: &Path,
    tile: TileCoord,
    background: Background,
    output: Option<&Path>,
) -> Result<()> {
    let (store, _) = DirectoryTileStore::open(root)
        .with_context(|| format!("Failed to open store {:?}", root))?;
    let bytes = read_tile(&store, tile, background)
        .with_context(|| format!("Failed to read tile {}", tile))?;
    match output {
        Some(path) => {
            std::fs::write(path, &bytes).with_context(|| format!("Failed to write {:?}", path))?;
            info!(tile = %tile, path = %path.display(), bytes = bytes.len(), "Tile written");
        }
        None => std::io::stdout()
            .write_all(&bytes)
            .context("Failed to write tile to stdout")?,
    }
    Ok(())
}

fn print_extent(path: &Path) -> Result<()> {
    let job = load_job_config(path)?;
    let mosaic = open_mosaic(&job)?;
    let engine = build_engine(&job, mosaic, false)?;
    let grid = engine.plan().context("Failed to plan target grid")?;

    let summary = serde_json::json!({
        "grid": grid,
        "bounds": grid.bounds(),
        "blocks": grid.block_count(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
