//! Synthetic raster patterns with known values.
//!
//! All generators return planar (band-major) `Vec<f32>` data: band `b`,
//! row `r`, column `c` lives at `b * width * height + r * width + c`.

/// Every sample of every band set to `value`.
pub fn constant(width: usize, height: usize, bands: usize, value: f32) -> Vec<f32> {
    vec![value; width * height * bands]
}

/// A horizontal ramp: band `b` holds `start + step * col + b`.
///
/// # Example
///
/// ```
/// use test_utils::ramp;
///
/// let data = ramp(4, 2, 1, 10.0, 2.0);
/// assert_eq!(&data[..4], &[10.0, 12.0, 14.0, 16.0]);
/// assert_eq!(data[4], 10.0); // second row starts over
/// ```
pub fn ramp(width: usize, height: usize, bands: usize, start: f32, step: f32) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height * bands);
    for band in 0..bands {
        for _row in 0..height {
            for col in 0..width {
                data.push(start + step * col as f32 + band as f32);
            }
        }
    }
    data
}

/// A checkerboard of `square`-pixel squares alternating `low` and `high`.
///
/// The top-left square is `low`.
pub fn checkerboard(
    width: usize,
    height: usize,
    bands: usize,
    square: usize,
    low: f32,
    high: f32,
) -> Vec<f32> {
    let square = square.max(1);
    let mut data = Vec::with_capacity(width * height * bands);
    for _band in 0..bands {
        for row in 0..height {
            for col in 0..width {
                let odd = (col / square + row / square) % 2 == 1;
                data.push(if odd { high } else { low });
            }
        }
    }
    data
}

/// Samples that encode their own position: `col * 1000 + row`, one band.
///
/// Makes it easy to check that a window was copied from the right place.
pub fn coordinate_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Planar data to interleaved bytes (rounded, clamped); for writing images.
pub fn to_interleaved_u8(data: &[f32], width: usize, height: usize, bands: usize) -> Vec<u8> {
    let n = width * height;
    let mut out = Vec::with_capacity(n * bands);
    for i in 0..n {
        for band in 0..bands {
            out.push(data[band * n + i].round().clamp(0.0, 255.0) as u8);
        }
    }
    out
}
