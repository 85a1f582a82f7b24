//! Core types for block-wise raster access.

use serde::{Deserialize, Serialize};

/// A rectangular pixel window of a raster.
///
/// Offsets may be negative and the window may extend past the raster edge;
/// pixels outside the raster read as nodata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub col_off: i64,
    pub row_off: i64,
    pub width: usize,
    pub height: usize,
}

impl Window {
    pub fn new(col_off: i64, row_off: i64, width: usize, height: usize) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    /// Window covering a whole `width` x `height` raster.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge.
    pub fn col_end(&self) -> i64 {
        self.col_off + self.width as i64
    }

    /// Exclusive bottom edge.
    pub fn row_end(&self) -> i64 {
        self.row_off + self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Overlap of two windows in the same pixel space.
    pub fn intersection(&self, other: &Window) -> Option<Window> {
        let c0 = self.col_off.max(other.col_off);
        let r0 = self.row_off.max(other.row_off);
        let c1 = self.col_end().min(other.col_end());
        let r1 = self.row_end().min(other.row_end());
        if c1 <= c0 || r1 <= r0 {
            return None;
        }
        Some(Window::new(c0, r0, (c1 - c0) as usize, (r1 - r0) as usize))
    }

    /// Part of the window inside a `width` x `height` raster.
    pub fn clip(&self, width: usize, height: usize) -> Option<Window> {
        self.intersection(&Window::full(width, height))
    }

    /// The window shifted into the pixel space of a raster whose origin is
    /// at `(col_off, row_off)` in this window's space.
    pub fn relative_to(&self, col_off: i64, row_off: i64) -> Window {
        Window::new(
            self.col_off - col_off,
            self.row_off - row_off,
            self.width,
            self.height,
        )
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// A block of pixel data.
///
/// Storage is planar (band-major): band `b`, row `r`, column `c` lives at
/// `b * width * height + r * width + c`. `NaN` marks nodata.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBlock {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub data: Vec<f32>,
}

impl RasterBlock {
    /// Create a block filled with nodata.
    pub fn nodata(width: usize, height: usize, bands: usize) -> Self {
        Self::filled(width, height, bands, f32::NAN)
    }

    /// Create a block with every sample set to `value`.
    pub fn filled(width: usize, height: usize, bands: usize, value: f32) -> Self {
        Self {
            width,
            height,
            bands,
            data: vec![value; width * height * bands],
        }
    }

    /// Wrap planar data; `None` if the length does not match.
    pub fn from_data(width: usize, height: usize, bands: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == width * height * bands).then_some(Self {
            width,
            height,
            bands,
            data,
        })
    }

    pub fn band_len(&self) -> usize {
        self.width * self.height
    }

    pub fn band(&self, band: usize) -> &[f32] {
        let n = self.band_len();
        &self.data[band * n..(band + 1) * n]
    }

    pub fn band_mut(&mut self, band: usize) -> &mut [f32] {
        let n = self.band_len();
        &mut self.data[band * n..(band + 1) * n]
    }

    #[inline]
    pub fn get(&self, band: usize, col: usize, row: usize) -> f32 {
        self.data[band * self.band_len() + row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, band: usize, col: usize, row: usize, value: f32) {
        let n = self.band_len();
        self.data[band * n + row * self.width + col] = value;
    }

    /// A pixel is valid when every band holds a finite value.
    pub fn is_valid(&self, col: usize, row: usize) -> bool {
        (0..self.bands).all(|b| self.get(b, col, row).is_finite())
    }

    pub fn is_all_nodata(&self) -> bool {
        self.data.iter().all(|v| !v.is_finite())
    }

    /// Copy the pixels of `src` (whose top-left pixel sits at `(col, row)`
    /// in this block) for which `accept(dst_valid, src_valid)` holds.
    pub fn paste_where(
        &mut self,
        src: &RasterBlock,
        col: i64,
        row: i64,
        accept: impl Fn(bool, bool) -> bool,
    ) {
        let dst = Window::full(self.width, self.height);
        let placed = Window::new(col, row, src.width, src.height);
        let Some(overlap) = dst.intersection(&placed) else {
            return;
        };
        let bands = self.bands.min(src.bands);
        for r in overlap.row_off..overlap.row_end() {
            for c in overlap.col_off..overlap.col_end() {
                let (dc, dr) = (c as usize, r as usize);
                let (sc, sr) = ((c - col) as usize, (r - row) as usize);
                if accept(self.is_valid(dc, dr), src.is_valid(sc, sr)) {
                    for b in 0..bands {
                        self.set(b, dc, dr, src.get(b, sc, sr));
                    }
                }
            }
        }
    }

    /// Size of the sample buffer in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// Planar 8-bit samples with one validity flag per pixel.
///
/// Decoded image sources are held in this form: a quarter of the size of
/// the equivalent [`RasterBlock`] for the colour bands.
#[derive(Debug, Clone, PartialEq)]
pub struct ByteRaster {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub data: Vec<u8>,
    pub valid: Vec<bool>,
}

impl ByteRaster {
    /// Create a raster with every pixel invalid.
    pub fn new(width: usize, height: usize, bands: usize) -> Self {
        Self {
            width,
            height,
            bands,
            data: vec![0; width * height * bands],
            valid: vec![false; width * height],
        }
    }

    #[inline]
    pub fn get(&self, band: usize, col: usize, row: usize) -> u8 {
        self.data[band * self.width * self.height + row * self.width + col]
    }

    #[inline]
    pub fn is_valid(&self, col: usize, row: usize) -> bool {
        self.valid[row * self.width + col]
    }

    pub fn memory_bytes(&self) -> usize {
        self.data.len() + self.valid.len()
    }
}

/// Every pixel of a source, decoded once and shared through the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePixels {
    Bytes(ByteRaster),
    Float(RasterBlock),
}

impl SourcePixels {
    pub fn width(&self) -> usize {
        match self {
            Self::Bytes(r) => r.width,
            Self::Float(b) => b.width,
        }
    }

    pub fn height(&self) -> usize {
        match self {
            Self::Bytes(r) => r.height,
            Self::Float(b) => b.height,
        }
    }

    pub fn bands(&self) -> usize {
        match self {
            Self::Bytes(r) => r.bands,
            Self::Float(b) => b.bands,
        }
    }

    pub fn memory_bytes(&self) -> usize {
        match self {
            Self::Bytes(r) => r.memory_bytes(),
            Self::Float(b) => b.memory_bytes(),
        }
    }

    /// Paste into `out` with the top-left corner at (`col`, `row`).
    ///
    /// Same contract as [`RasterBlock::paste_where`]; byte samples are widened
    /// only for the overlapping pixels.
    pub fn paste_into(
        &self,
        out: &mut RasterBlock,
        col: i64,
        row: i64,
        accept: impl Fn(bool, bool) -> bool,
    ) {
        let src = match self {
            Self::Float(block) => return out.paste_where(block, col, row, accept),
            Self::Bytes(src) => src,
        };
        let dst = Window::full(out.width, out.height);
        let placed = Window::new(col, row, src.width, src.height);
        let Some(overlap) = dst.intersection(&placed) else {
            return;
        };
        let bands = out.bands.min(src.bands);
        for r in overlap.row_off..overlap.row_end() {
            for c in overlap.col_off..overlap.col_end() {
                let (dc, dr) = (c as usize, r as usize);
                let (sc, sr) = ((c - col) as usize, (r - row) as usize);
                if accept(out.is_valid(dc, dr), src.is_valid(sc, sr)) {
                    for b in 0..bands {
                        out.set(b, dc, dr, src.get(b, sc, sr) as f32);
                    }
                }
            }
        }
    }

    /// Copy a window out as floats; pixels outside the source are nodata.
    pub fn window(&self, window: &Window) -> RasterBlock {
        let mut out = RasterBlock::nodata(window.width, window.height, self.bands());
        self.paste_into(&mut out, -window.col_off, -window.row_off, |_, src_valid| src_valid);
        out
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate as a fraction (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
