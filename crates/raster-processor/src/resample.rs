//! Resampling kernels.
//!
//! Sample positions are fractional pixel coordinates in the corner
//! convention: pixel `(c, r)` covers `[c, c+1) x [r, r+1)` and its centre is
//! at `(c + 0.5, r + 0.5)`.
//!
//! All kernels are normalised by the sum of the weights of the *valid*
//! samples in their support, so flat input stays flat and nodata never
//! leaks into neighbouring values. The pixel containing the sample position
//! decides validity: if it is nodata (or outside the block) the result is
//! nodata, which keeps data edges where the source puts them.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::types::RasterBlock;

/// Weight sums below this are treated as an empty support.
const MIN_WEIGHT_SUM: f64 = 1e-9;

/// Lobes of the Lanczos window.
const LANCZOS_A: f64 = 3.0;

/// Resampling kernel applied when reading source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingKernel {
    /// Value of the containing pixel.
    Nearest,
    /// Triangle filter over the 2x2 neighbourhood.
    Bilinear,
    /// Catmull-Rom cubic over the 4x4 neighbourhood.
    Cubic,
    /// Windowed sinc with three lobes.
    #[default]
    Lanczos,
}

impl ResamplingKernel {
    /// Support radius in source pixels at unit scale.
    pub fn radius(&self) -> f64 {
        match self {
            Self::Nearest => 0.5,
            Self::Bilinear => 1.0,
            Self::Cubic => 2.0,
            Self::Lanczos => LANCZOS_A,
        }
    }

    /// Kernel weight at distance `t` (in kernel units).
    pub fn weight(&self, t: f64) -> f64 {
        let t = t.abs();
        match self {
            Self::Nearest => {
                if t < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Bilinear => (1.0 - t).max(0.0),
            Self::Cubic => catmull_rom(t),
            Self::Lanczos => {
                if t >= LANCZOS_A {
                    0.0
                } else {
                    sinc(t) * sinc(t / LANCZOS_A)
                }
            }
        }
    }

    /// Extra source pixels to read around a window so the kernel support is
    /// always covered at the given downsampling `scale`.
    pub fn halo(&self, scale: f64) -> usize {
        let stretch = if scale.is_finite() { scale.max(1.0) } else { 1.0 };
        (self.radius() * stretch).ceil() as usize + 1
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Bilinear => "bilinear",
            Self::Cubic => "cubic",
            Self::Lanczos => "lanczos",
        }
    }

    /// Sample all bands of `block` at `(x, y)`.
    ///
    /// `scale` is the number of source pixels per output pixel along each
    /// axis; values above one stretch the kernel so it averages over the
    /// whole footprint. Writes one value per band into `out` and returns
    /// `false` (leaving `out` as NaN) when the result is nodata.
    pub fn sample(&self, block: &RasterBlock, x: f64, y: f64, scale: (f64, f64), out: &mut [f32]) -> bool {
        out.iter_mut().for_each(|v| *v = f32::NAN);
        if !x.is_finite() || !y.is_finite() {
            return false;
        }

        let (col, row) = (x.floor(), y.floor());
        if col < 0.0 || row < 0.0 || col >= block.width as f64 || row >= block.height as f64 {
            return false;
        }
        let (col, row) = (col as usize, row as usize);
        if !block.is_valid(col, row) {
            return false;
        }

        if *self == Self::Nearest {
            for (b, v) in out.iter_mut().enumerate().take(block.bands) {
                *v = block.get(b, col, row);
            }
            return true;
        }

        let sx = stretch(scale.0);
        let sy = stretch(scale.1);
        let xs = self.axis_weights(x, sx, block.width);
        let ys = self.axis_weights(y, sy, block.height);

        let bands = block.bands.min(out.len());
        let mut acc = vec![0.0f64; bands];
        let mut weight_sum = 0.0;

        for &(r, wy) in &ys {
            for &(c, wx) in &xs {
                if !block.is_valid(c, r) {
                    continue;
                }
                let w = wx * wy;
                weight_sum += w;
                for (b, a) in acc.iter_mut().enumerate() {
                    *a += w * block.get(b, c, r) as f64;
                }
            }
        }

        if weight_sum.abs() < MIN_WEIGHT_SUM {
            // Support cancelled out; fall back to the containing pixel.
            for (b, v) in out.iter_mut().enumerate().take(bands) {
                *v = block.get(b, col, row);
            }
            return true;
        }

        for (v, a) in out.iter_mut().zip(acc.iter()) {
            *v = (*a / weight_sum) as f32;
        }
        true
    }

    /// Non-zero weights along one axis: `(pixel index, weight)`.
    fn axis_weights(&self, pos: f64, stretch: f64, len: usize) -> Vec<(usize, f64)> {
        let reach = self.radius() * stretch;
        let first = (pos - 0.5 - reach).floor().max(0.0) as usize;
        let last = ((pos - 0.5 + reach).ceil().max(0.0) as usize).min(len.saturating_sub(1));
        (first..=last)
            .filter_map(|i| {
                let w = self.weight((i as f64 + 0.5 - pos) / stretch);
                (w != 0.0).then_some((i, w))
            })
            .collect()
    }
}

impl fmt::Display for ResamplingKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResamplingKernel {
    type Err = String;

    /// Parse from string (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nearest" | "near" => Ok(Self::Nearest),
            "bilinear" | "linear" => Ok(Self::Bilinear),
            "cubic" | "bicubic" => Ok(Self::Cubic),
            "lanczos" => Ok(Self::Lanczos),
            other => Err(format!("unknown resampling kernel '{}'", other)),
        }
    }
}

fn stretch(scale: f64) -> f64 {
    if scale.is_finite() {
        scale.max(1.0)
    } else {
        1.0
    }
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        let px = PI * x;
        px.sin() / px
    }
}

/// Catmull-Rom spline (cubic convolution with a = -0.5).
fn catmull_rom(t: f64) -> f64 {
    if t < 1.0 {
        1.5 * t * t * t - 2.5 * t * t + 1.0
    } else if t < 2.0 {
        -0.5 * t * t * t + 2.5 * t * t - 4.0 * t + 2.0
    } else {
        0.0
    }
}
