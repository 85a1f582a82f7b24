//! Block encodings for stored tiles.
//!
//! Blocks are quantised to 8 bits only here, at write time: samples are
//! rounded and clamped to `0..=255`, and nodata becomes the configured
//! nodata byte.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageFormat};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::error::{RasterProcessorError, Result};
use crate::types::RasterBlock;

/// How blocks are encoded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TileCodec {
    /// Planar bytes, no header.
    Raw,
    /// Planar bytes, zlib-compressed.
    Deflate {
        #[serde(default = "default_deflate_level")]
        level: u32,
    },
    /// Lossless PNG (1 to 4 bands).
    Png,
    /// Lossy JPEG (3 bands, no alpha).
    Jpeg {
        #[serde(default = "default_jpeg_quality")]
        quality: u8,
    },
}

fn default_deflate_level() -> u32 {
    6
}

fn default_jpeg_quality() -> u8 {
    85
}

impl Default for TileCodec {
    fn default() -> Self {
        Self::Png
    }
}

impl TileCodec {
    /// File extension for blocks in this encoding.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Deflate { .. } => "zz",
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
        }
    }

    /// Check that the codec can store blocks with `bands` bands.
    pub fn validate(&self, bands: usize, has_alpha: bool) -> Result<()> {
        match self {
            Self::Deflate { level } if *level > 9 => Err(RasterProcessorError::configuration(
                format!("deflate level must be 0-9, got {}", level),
            )),
            Self::Png if !(1..=4).contains(&bands) => Err(RasterProcessorError::configuration(
                format!("PNG blocks need 1 to 4 bands, got {}", bands),
            )),
            Self::Jpeg { .. } if has_alpha => Err(RasterProcessorError::configuration(
                "JPEG output cannot carry an alpha band; use PNG or deflate with a mask",
            )),
            Self::Jpeg { .. } if bands != 3 => Err(RasterProcessorError::configuration(
                format!("JPEG blocks need exactly 3 bands, got {}", bands),
            )),
            Self::Jpeg { quality } if !(1..=100).contains(quality) => {
                Err(RasterProcessorError::configuration(format!(
                    "JPEG quality must be 1-100, got {}",
                    quality
                )))
            }
            _ => Ok(()),
        }
    }

    /// Quantise and encode a block.
    pub fn encode(&self, block: &RasterBlock, nodata: u8) -> Result<Vec<u8>> {
        let planar = quantise(block, nodata);
        match self {
            Self::Raw => Ok(planar),
            Self::Deflate { level } => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(*level));
                encoder.write_all(&planar)?;
                Ok(encoder.finish()?)
            }
            Self::Png => {
                let (interleaved, color) = interleave(&planar, block)?;
                let mut out = Vec::new();
                PngEncoder::new(&mut out)
                    .write_image(&interleaved, block.width as u32, block.height as u32, color)
                    .map_err(|e| RasterProcessorError::codec(format!("PNG encode: {}", e)))?;
                Ok(out)
            }
            Self::Jpeg { quality } => {
                let (interleaved, color) = interleave(&planar, block)?;
                let mut out = Vec::new();
                JpegEncoder::new_with_quality(&mut out, *quality)
                    .write_image(&interleaved, block.width as u32, block.height as u32, color)
                    .map_err(|e| RasterProcessorError::codec(format!("JPEG encode: {}", e)))?;
                Ok(out)
            }
        }
    }

    /// Decode a block of known shape back to float samples.
    pub fn decode(&self, bytes: &[u8], width: usize, height: usize, bands: usize) -> Result<RasterBlock> {
        let planar = match self {
            Self::Raw => bytes.to_vec(),
            Self::Deflate { .. } => {
                let mut out = Vec::with_capacity(width * height * bands);
                ZlibDecoder::new(bytes).read_to_end(&mut out)?;
                out
            }
            Self::Png => deinterleave(decode_image(bytes, ImageFormat::Png, bands)?, bands),
            Self::Jpeg { .. } => deinterleave(decode_image(bytes, ImageFormat::Jpeg, bands)?, bands),
        };
        let data = planar.into_iter().map(f32::from).collect();
        RasterBlock::from_data(width, height, bands, data).ok_or_else(|| {
            RasterProcessorError::codec(format!(
                "decoded block does not match {}x{}x{}",
                width, height, bands
            ))
        })
    }
}

/// Round and clamp to bytes, planar; nodata becomes `nodata`.
pub fn quantise(block: &RasterBlock, nodata: u8) -> Vec<u8> {
    block
        .data
        .iter()
        .map(|&v| {
            if v.is_finite() {
                v.round().clamp(0.0, 255.0) as u8
            } else {
                nodata
            }
        })
        .collect()
}

fn color_type(bands: usize) -> Result<ColorType> {
    match bands {
        1 => Ok(ColorType::L8),
        2 => Ok(ColorType::La8),
        3 => Ok(ColorType::Rgb8),
        4 => Ok(ColorType::Rgba8),
        n => Err(RasterProcessorError::codec(format!(
            "cannot store {} bands in an image",
            n
        ))),
    }
}

fn interleave(planar: &[u8], block: &RasterBlock) -> Result<(Vec<u8>, ColorType)> {
    let color = color_type(block.bands)?;
    let n = block.band_len();
    let mut out = Vec::with_capacity(planar.len());
    for i in 0..n {
        for b in 0..block.bands {
            out.push(planar[b * n + i]);
        }
    }
    Ok((out, color))
}

fn decode_image(bytes: &[u8], format: ImageFormat, bands: usize) -> Result<Vec<u8>> {
    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| RasterProcessorError::codec(format!("{:?} decode: {}", format, e)))?;
    match bands {
        1 => Ok(img.to_luma8().into_raw()),
        2 => Ok(img.to_luma_alpha8().into_raw()),
        3 => Ok(img.to_rgb8().into_raw()),
        4 => Ok(img.to_rgba8().into_raw()),
        n => Err(RasterProcessorError::codec(format!(
            "cannot read {} bands from an image",
            n
        ))),
    }
}

fn deinterleave(interleaved: Vec<u8>, bands: usize) -> Vec<u8> {
    let n = interleaved.len() / bands;
    let mut out = vec![0u8; interleaved.len()];
    for (i, px) in interleaved.chunks_exact(bands).enumerate() {
        for (b, &v) in px.iter().enumerate() {
            out[b * n + i] = v;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> RasterBlock {
        let mut b = RasterBlock::nodata(3, 2, 4);
        for (i, v) in b.data.iter_mut().enumerate() {
            if i % 7 != 0 {
                *v = (i * 10) as f32 + 0.4;
            }
        }
        b
    }

    #[test]
    fn test_quantise_rounds_clamps_and_fills_nodata() {
        let b = RasterBlock::from_data(4, 1, 1, vec![-3.0, 12.5, 300.0, f32::NAN]).unwrap();
        assert_eq!(quantise(&b, 7), vec![0, 13, 255, 7]);
    }

    #[test]
    fn test_lossless_codecs_preserve_bytes() {
        let b = block();
        let expected = quantise(&b, 0);
        for codec in [TileCodec::Raw, TileCodec::Deflate { level: 6 }, TileCodec::Png] {
            let bytes = codec.encode(&b, 0).unwrap();
            let back = codec.decode(&bytes, 3, 2, 4).unwrap();
            let back: Vec<u8> = back.data.iter().map(|&v| v as u8).collect();
            assert_eq!(back, expected, "{:?}", codec);
        }
    }

    #[test]
    fn test_jpeg_roundtrip_is_close() {
        let b = RasterBlock::filled(16, 16, 3, 128.0);
        let codec = TileCodec::Jpeg { quality: 95 };
        let bytes = codec.encode(&b, 0).unwrap();
        let back = codec.decode(&bytes, 16, 16, 3).unwrap();
        assert!(back.data.iter().all(|v| (v - 128.0).abs() <= 2.0));
    }

    #[test]
    fn test_validate() {
        assert!(TileCodec::Jpeg { quality: 85 }.validate(4, true).is_err());
        assert!(TileCodec::Jpeg { quality: 85 }.validate(1, false).is_err());
        assert!(TileCodec::Jpeg { quality: 85 }.validate(3, false).is_ok());
        assert!(TileCodec::Png.validate(5, false).is_err());
        assert!(TileCodec::Deflate { level: 12 }.validate(3, false).is_err());
    }

    #[test]
    fn test_serde_shape() {
        let codec: TileCodec = serde_json::from_str(r#"{"type": "jpeg", "quality": 70}"#).unwrap();
        assert_eq!(codec, TileCodec::Jpeg { quality: 70 });
        let codec: TileCodec = serde_json::from_str(r#"{"type": "deflate"}"#).unwrap();
        assert_eq!(codec, TileCodec::Deflate { level: 6 });
    }
}
