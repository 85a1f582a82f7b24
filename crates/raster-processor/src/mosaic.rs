//! Virtual mosaic of same-projection source tiles.
//!
//! [`MosaicBuilder`] checks that all sources share a spatial reference, band
//! count and pixel grid, then produces a [`Mosaic`]: a lazy raster covering
//! the union of the source extents. No pixels are read until a window of the
//! mosaic is requested, and then only from the sources that intersect it.

use ortho_common::{BoundingBox, GeoTransform, SpatialRef};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::cache::BlockCache;
use crate::error::{RasterProcessorError, Result};
use crate::source::RasterSource;
use crate::types::{CacheStats, RasterBlock, SourcePixels, Window};

/// Relative tolerance when comparing source pixel sizes.
const PIXEL_SIZE_TOLERANCE: f64 = 1e-9;

/// Tolerance, in pixels, for source origins lying on the common grid.
const GRID_OFFSET_TOLERANCE: f64 = 1e-6;

/// Default decoded-source cache budget.
const DEFAULT_CACHE_BYTES: usize = 256 * 1024 * 1024;

/// How overlapping valid pixels of different sources are resolved.
///
/// Nodata never wins over valid data under either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// The earliest-added source with a valid pixel wins.
    FirstWins,
    /// The latest-added source with a valid pixel wins.
    LastWins,
}

/// Collects sources and validates them into a [`Mosaic`].
pub struct MosaicBuilder {
    srs: SpatialRef,
    policy: OverlapPolicy,
    sources: Vec<Arc<dyn RasterSource>>,
    cache_bytes: usize,
}

impl MosaicBuilder {
    pub fn new(srs: SpatialRef, policy: OverlapPolicy) -> Self {
        Self {
            srs,
            policy,
            sources: Vec::new(),
            cache_bytes: DEFAULT_CACHE_BYTES,
        }
    }

    /// Set the decoded-source cache budget in bytes.
    pub fn with_cache_size(mut self, bytes: usize) -> Self {
        self.cache_bytes = bytes;
        self
    }

    pub fn add_source(&mut self, source: Arc<dyn RasterSource>) -> &mut Self {
        self.sources.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Validate the sources and build the mosaic.
    ///
    /// Fails with a configuration error, before any pixel is read, when the
    /// list is empty or a source disagrees with the first one on spatial
    /// reference, band count, pixel size or grid alignment.
    pub fn build(self) -> Result<Mosaic> {
        let first = self
            .sources
            .first()
            .ok_or_else(|| RasterProcessorError::configuration("mosaic has no sources"))?;

        let bands = first.bands();
        let reference = first.geotransform();
        let (res_x, res_y) = (reference.a, -reference.e);

        let mut union = BoundingBox::empty();
        for (i, source) in self.sources.iter().enumerate() {
            if source.srs() != &self.srs {
                return Err(RasterProcessorError::configuration(format!(
                    "source {} ({}) is in {}, mosaic is declared in {}",
                    i,
                    source.description(),
                    source.srs(),
                    self.srs
                )));
            }
            if source.bands() != bands {
                return Err(RasterProcessorError::configuration(format!(
                    "source {} ({}) has {} bands, expected {}",
                    i,
                    source.description(),
                    source.bands(),
                    bands
                )));
            }
            let gt = source.geotransform();
            if !gt.is_north_up() || gt.a <= 0.0 || gt.e >= 0.0 {
                return Err(RasterProcessorError::configuration(format!(
                    "source {} ({}) has a rotated or flipped geotransform {:?}",
                    i,
                    source.description(),
                    gt.to_gdal()
                )));
            }
            if !same_size(gt.a, res_x) || !same_size(-gt.e, res_y) {
                return Err(RasterProcessorError::configuration(format!(
                    "source {} ({}) has pixel size {}x{}, expected {}x{}",
                    i,
                    source.description(),
                    gt.a,
                    -gt.e,
                    res_x,
                    res_y
                )));
            }
            let off_x = (gt.c - reference.c) / res_x;
            let off_y = (reference.f - gt.f) / res_y;
            if (off_x - off_x.round()).abs() > GRID_OFFSET_TOLERANCE
                || (off_y - off_y.round()).abs() > GRID_OFFSET_TOLERANCE
            {
                return Err(RasterProcessorError::configuration(format!(
                    "source {} ({}) is not aligned to the pixel grid of source 0",
                    i,
                    source.description()
                )));
            }
            union = union.union(&source.bounds());
        }

        // Origin on the common grid, so every source lands on whole pixels.
        let col0 = ((union.min_x - reference.c) / res_x).round();
        let row0 = ((reference.f - union.max_y) / res_y).round();
        let geotransform = GeoTransform::north_up(
            reference.c + col0 * res_x,
            reference.f - row0 * res_y,
            res_x,
            res_y,
        );
        let width = ((union.max_x - geotransform.c) / res_x).round() as usize;
        let height = ((geotransform.f - union.min_y) / res_y).round() as usize;

        let placements = self
            .sources
            .iter()
            .map(|s| {
                let gt = s.geotransform();
                let col = ((gt.c - geotransform.c) / res_x).round() as i64;
                let row = ((geotransform.f - gt.f) / res_y).round() as i64;
                Window::new(col, row, s.width(), s.height())
            })
            .collect();

        info!(
            sources = self.sources.len(),
            width = width,
            height = height,
            bands = bands,
            policy = ?self.policy,
            srs = %self.srs,
            "Built mosaic"
        );

        Ok(Mosaic {
            srs: self.srs,
            policy: self.policy,
            geotransform,
            width,
            height,
            bands,
            decoding: self.sources.iter().map(|_| Mutex::new(())).collect(),
            sources: self.sources,
            placements,
            cache: Mutex::new(BlockCache::new(self.cache_bytes)),
        })
    }
}

fn same_size(a: f64, b: f64) -> bool {
    (a - b).abs() <= PIXEL_SIZE_TOLERANCE * a.abs().max(b.abs())
}

/// A lazy composition of many sources on one pixel grid.
pub struct Mosaic {
    srs: SpatialRef,
    policy: OverlapPolicy,
    geotransform: GeoTransform,
    width: usize,
    height: usize,
    bands: usize,
    sources: Vec<Arc<dyn RasterSource>>,
    /// Pixel window of each source in mosaic space.
    placements: Vec<Window>,
    /// One lock per source so each is decoded by a single thread at a time.
    decoding: Vec<Mutex<()>>,
    cache: Mutex<BlockCache>,
}

impl Mosaic {
    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Pixel window each source occupies in the mosaic.
    pub fn placements(&self) -> &[Window] {
        &self.placements
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache
            .lock()
            .map(|c| c.stats())
            .unwrap_or_default()
    }

    /// Decoded pixels of one source, from the cache when possible.
    ///
    /// Threads needing the same uncached source wait for the first one's
    /// decode instead of decoding it again.
    fn source_block(&self, index: usize) -> Result<Arc<SourcePixels>> {
        let _decoding = self.decoding[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(block) = cache.get(&index) {
                return Ok(block);
            }
        }

        let source = &self.sources[index];
        debug!(source = %source.description(), "Decoding mosaic source");
        let block = Arc::new(source.decode_all()?);

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(index, Arc::clone(&block));
        }
        Ok(block)
    }
}

impl RasterSource for Mosaic {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn bands(&self) -> usize {
        self.bands
    }

    fn geotransform(&self) -> GeoTransform {
        self.geotransform
    }

    fn srs(&self) -> &SpatialRef {
        &self.srs
    }

    fn read_window(&self, window: &Window) -> Result<RasterBlock> {
        let mut out = RasterBlock::nodata(window.width, window.height, self.bands);

        let order: Box<dyn Iterator<Item = usize>> = match self.policy {
            OverlapPolicy::FirstWins => Box::new(0..self.sources.len()),
            OverlapPolicy::LastWins => Box::new((0..self.sources.len()).rev()),
        };

        for index in order {
            let placement = self.placements[index];
            if placement.intersection(window).is_none() {
                continue;
            }
            let block = self.source_block(index)?;
            block.paste_into(
                &mut out,
                placement.col_off - window.col_off,
                placement.row_off - window.row_off,
                |dst_valid, src_valid| src_valid && !dst_valid,
            );
        }
        Ok(out)
    }

    fn description(&self) -> String {
        format!(
            "mosaic of {} sources ({}x{}x{})",
            self.sources.len(),
            self.width,
            self.height,
            self.bands
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryRaster;

    fn tile(x: f64, y: f64, size: usize, value: f32, srs: u32) -> Arc<dyn RasterSource> {
        Arc::new(
            MemoryRaster::new(
                size,
                size,
                1,
                vec![value; size * size],
                GeoTransform::north_up(x, y, 1.0, 1.0),
                SpatialRef::epsg(srs),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_union_extent_and_placement() {
        let mut builder = MosaicBuilder::new(SpatialRef::epsg(5514), OverlapPolicy::FirstWins);
        builder.add_source(tile(10.0, 20.0, 4, 1.0, 5514));
        builder.add_source(tile(14.0, 16.0, 4, 2.0, 5514));
        let mosaic = builder.build().unwrap();

        assert_eq!((mosaic.width(), mosaic.height()), (8, 8));
        assert_eq!(mosaic.geotransform().to_gdal(), [10.0, 1.0, 0.0, 20.0, 0.0, -1.0]);
        assert_eq!(mosaic.placements()[1], Window::new(4, 4, 4, 4));

        let block = mosaic.read_window(&Window::full(8, 8)).unwrap();
        assert_eq!(block.get(0, 0, 0), 1.0);
        assert_eq!(block.get(0, 7, 7), 2.0);
        assert!(block.get(0, 7, 0).is_nan());
    }

    #[test]
    fn test_overlap_policies() {
        for (policy, expected) in [(OverlapPolicy::FirstWins, 1.0), (OverlapPolicy::LastWins, 2.0)] {
            let mut builder = MosaicBuilder::new(SpatialRef::epsg(5514), policy);
            builder.add_source(tile(0.0, 4.0, 4, 1.0, 5514));
            builder.add_source(tile(2.0, 4.0, 4, 2.0, 5514));
            let mosaic = builder.build().unwrap();
            let block = mosaic.read_window(&Window::new(2, 0, 2, 1)).unwrap();
            assert_eq!(block.data, vec![expected; 2], "{:?}", policy);
        }
    }

    #[test]
    fn test_rejects_srs_mismatch() {
        let mut builder = MosaicBuilder::new(SpatialRef::epsg(5514), OverlapPolicy::LastWins);
        builder.add_source(tile(0.0, 4.0, 4, 1.0, 5514));
        builder.add_source(tile(4.0, 4.0, 4, 1.0, 3857));
        let err = builder.build().err().unwrap();
        assert!(err.to_string().contains("EPSG:3857"));
    }

    #[test]
    fn test_rejects_empty_and_misaligned() {
        let builder = MosaicBuilder::new(SpatialRef::epsg(5514), OverlapPolicy::LastWins);
        assert!(matches!(builder.build(), Err(RasterProcessorError::Configuration(_))));

        let mut builder = MosaicBuilder::new(SpatialRef::epsg(5514), OverlapPolicy::LastWins);
        builder.add_source(tile(0.0, 4.0, 4, 1.0, 5514));
        builder.add_source(tile(4.5, 4.0, 4, 1.0, 5514));
        assert!(matches!(builder.build(), Err(RasterProcessorError::Configuration(_))));
    }

    #[test]
    fn test_cache_is_used() {
        let mut builder = MosaicBuilder::new(SpatialRef::epsg(5514), OverlapPolicy::LastWins);
        builder.add_source(tile(0.0, 4.0, 4, 1.0, 5514));
        let mosaic = builder.build().unwrap();
        mosaic.read_window(&Window::new(0, 0, 2, 2)).unwrap();
        mosaic.read_window(&Window::new(2, 2, 2, 2)).unwrap();
        let stats = mosaic.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }
}
