//! Orthophoto mosaicking, masking, reprojection and overview generation.
//!
//! The crate turns a set of georeferenced source tiles into a tiled,
//! web-mercator-aligned image pyramid:
//!
//! - **Mosaic**: many aligned tiles presented as one virtual raster
//! - **Mask**: vector coverage polygons burnt into an alpha raster
//! - **Warp**: block-wise reprojection through a coordinate pipeline
//! - **Overviews**: a pyramid built from the stored full-resolution blocks
//!
//! # Architecture
//!
//! ```text
//! source tiles (image + world file)
//!      │
//!      ▼
//! MosaicBuilder::build()  ──►  Mosaic (RasterSource, block cache)
//!      │                           │
//!      │   VectorMask ──► MaskRasterizer::rasterize_for() ──► AlphaRaster
//!      │                           │
//!      ▼                           ▼
//! WarpEngine::run(store)   (one rayon task per output block)
//!      │
//!      ├─► plan block: densified boundary ──► inverse pipeline ──► source window + halo
//!      ├─► resample every pixel, append alpha
//!      └─► encode ──► TileStore::write_block (level 0)
//!               │
//!               ▼
//! OverviewGenerator::build(store)  (level n from level n - 1)
//!      │
//!      ▼
//! read_tile(store, z/x/y, background)  (level matching z, JPEG or PNG)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use raster_processor::{MosaicBuilder, OverlapPolicy, WarpEngine, WarpOptions, DirectoryTileStore};
//!
//! let mut builder = MosaicBuilder::new(source_srs, OverlapPolicy::LastWins);
//! for path in tiles {
//!     builder.add_source(Arc::new(ImageSource::open(path, source_srs.clone())?));
//! }
//! let mosaic = Arc::new(builder.build()?);
//!
//! let engine = WarpEngine::new(mosaic, target_srs, pipeline, WarpOptions::new(19))?;
//! let store = DirectoryTileStore::new("out", "png")?;
//! let report = engine.run(&store)?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod mask;
pub mod mosaic;
pub mod overview;
pub mod resample;
pub mod source;
pub mod store;
pub mod types;
pub mod warp;
pub mod xyz;

// Re-export commonly used types at crate root
pub use cache::BlockCache;
pub use config::RasterProcessorConfig;
pub use error::{GeometryError, RasterProcessorError, Result};
pub use mask::{
    AlphaRaster, CoverageLayer, MaskOptions, MaskRasterizer, Polygon, Ring, VectorMask,
};
pub use mosaic::{Mosaic, MosaicBuilder, OverlapPolicy};
pub use overview::{OverviewGenerator, OverviewOptions, OverviewReport};
pub use resample::ResamplingKernel;
pub use source::{ImageSource, MemoryRaster, RasterSource};
pub use store::{
    BlockKey, DirectoryTileStore, LevelInfo, Manifest, MemoryTileStore, RunStatus, TileCodec,
    TileStore,
};
pub use types::{ByteRaster, CacheStats, RasterBlock, SourcePixels, Window};
pub use warp::{OutputGrid, OutputOptions, WarpEngine, WarpOptions, WarpReport};
pub use xyz::{read_tile, read_tile_from, Background};
