//! Georeferenced raster inputs.

pub mod image;

pub use self::image::ImageSource;

use ortho_common::{BoundingBox, GeoTransform, SpatialRef};

use crate::error::{RasterProcessorError, Result};
use crate::types::{RasterBlock, SourcePixels, Window};

/// A georeferenced raster that can be read window by window.
///
/// Implementations are shared read-only between worker threads.
pub trait RasterSource: Send + Sync {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn bands(&self) -> usize;

    fn geotransform(&self) -> GeoTransform;

    fn srs(&self) -> &SpatialRef;

    /// Read a window of all bands.
    ///
    /// The window may extend past the raster; those pixels read as nodata.
    fn read_window(&self, window: &Window) -> Result<RasterBlock>;

    /// Every pixel of the raster, for callers that cache whole sources.
    ///
    /// 8-bit sources override this to return [`SourcePixels::Bytes`].
    fn decode_all(&self) -> Result<SourcePixels> {
        let full = Window::full(self.width(), self.height());
        Ok(SourcePixels::Float(self.read_window(&full)?))
    }

    /// Ground extent of the raster.
    fn bounds(&self) -> BoundingBox {
        self.geotransform().bounds(self.width(), self.height())
    }

    /// Short label for log messages.
    fn description(&self) -> String {
        format!("{}x{}x{} raster", self.width(), self.height(), self.bands())
    }
}

/// A raster held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    block: RasterBlock,
    geotransform: GeoTransform,
    srs: SpatialRef,
}

impl MemoryRaster {
    /// Wrap planar `data` of `bands` bands.
    pub fn new(
        width: usize,
        height: usize,
        bands: usize,
        data: Vec<f32>,
        geotransform: GeoTransform,
        srs: SpatialRef,
    ) -> Result<Self> {
        if width == 0 || height == 0 || bands == 0 {
            return Err(RasterProcessorError::configuration(format!(
                "raster dimensions must be positive, got {}x{}x{}",
                width, height, bands
            )));
        }
        let len = data.len();
        let block = RasterBlock::from_data(width, height, bands, data).ok_or_else(|| {
            RasterProcessorError::configuration(format!(
                "expected {} samples for a {}x{}x{} raster, got {}",
                width * height * bands,
                width,
                height,
                bands,
                len
            ))
        })?;
        Ok(Self {
            block,
            geotransform,
            srs,
        })
    }

    pub fn block(&self) -> &RasterBlock {
        &self.block
    }
}

impl RasterSource for MemoryRaster {
    fn width(&self) -> usize {
        self.block.width
    }

    fn height(&self) -> usize {
        self.block.height
    }

    fn bands(&self) -> usize {
        self.block.bands
    }

    fn geotransform(&self) -> GeoTransform {
        self.geotransform
    }

    fn srs(&self) -> &SpatialRef {
        &self.srs
    }

    fn read_window(&self, window: &Window) -> Result<RasterBlock> {
        Ok(copy_window(&self.block, window))
    }
}

/// Copy `window` out of a full raster block, padding with nodata.
pub(crate) fn copy_window(full: &RasterBlock, window: &Window) -> RasterBlock {
    let mut out = RasterBlock::nodata(window.width, window.height, full.bands);
    out.paste_where(full, -window.col_off, -window.row_off, |_, _| true);
    out
}
