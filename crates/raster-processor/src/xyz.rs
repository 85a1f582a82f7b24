//! XYZ tile reads over a stored pyramid.
//!
//! A `z/x/y` tile is cut from the pyramid level whose resolution is the
//! tile grid's resolution at `z`. Nothing is resampled: the tile window is
//! a whole-pixel window of that level. Pixels outside the level, in blocks
//! that were never stored, or transparent in the store show the background.

use ortho_common::{SrsCode, TileCoord, TileGrid};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{RasterProcessorError, Result};
use crate::overview::read_level;
use crate::store::{Manifest, TileCodec, TileStore};
use crate::types::{RasterBlock, Window};
use crate::warp::OutputGrid;

/// JPEG quality of tiles composited over a background colour.
pub const TILE_JPEG_QUALITY: u8 = 95;

/// Relative resolution mismatch tolerated between a level and a zoom.
const RESOLUTION_TOLERANCE: f64 = 1e-9;

/// What shows through where the pyramid has no visible pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    /// Keep transparency: an RGBA PNG with colour premultiplied by alpha.
    Alpha,
    /// Composite over a colour: an RGB JPEG.
    Rgb(u8, u8, u8),
}

impl Background {
    /// Encoding of tiles read with this background.
    pub fn codec(&self) -> TileCodec {
        match self {
            Self::Alpha => TileCodec::Png,
            Self::Rgb(..) => TileCodec::Jpeg {
                quality: TILE_JPEG_QUALITY,
            },
        }
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alpha => write!(f, "alpha"),
            Self::Rgb(r, g, b) => write!(f, "{},{},{}", r, g, b),
        }
    }
}

impl FromStr for Background {
    type Err = String;

    /// `alpha`, or an `r,g,b` colour.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("alpha") {
            return Ok(Self::Alpha);
        }
        let channels = s
            .split(',')
            .map(|c| c.trim().parse::<u8>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| format!("invalid background '{}', expected 'alpha' or 'r,g,b'", s))?;
        match channels[..] {
            [r, g, b] => Ok(Self::Rgb(r, g, b)),
            _ => Err(format!("invalid background '{}', expected 'alpha' or 'r,g,b'", s)),
        }
    }
}

/// Read tile `coord` of the default 256-pixel web mercator grid.
pub fn read_tile(store: &dyn TileStore, coord: TileCoord, background: Background) -> Result<Vec<u8>> {
    read_tile_from(store, &TileGrid::default(), coord, background)
}

/// Read tile `coord` of `tiles` and encode it for `background`.
pub fn read_tile_from(
    store: &dyn TileStore,
    tiles: &TileGrid,
    coord: TileCoord,
    background: Background,
) -> Result<Vec<u8>> {
    let manifest = store
        .read_manifest()?
        .ok_or_else(|| RasterProcessorError::InvalidManifest("store has no manifest".into()))?;
    if manifest.grid.srs.code() != &SrsCode::WEB_MERCATOR {
        return Err(RasterProcessorError::configuration(format!(
            "tiles need a web mercator pyramid, the store holds {}",
            manifest.grid.srs
        )));
    }
    if !coord.is_valid() {
        return Err(RasterProcessorError::configuration(format!(
            "tile {} is outside the tile matrix",
            coord
        )));
    }
    let (level, grid) = level_for_zoom(&manifest, tiles, coord.z)?;
    let colour_bands = grid.colour_bands();
    if !matches!(colour_bands, 1 | 3) {
        return Err(RasterProcessorError::configuration(format!(
            "tiles need 1 or 3 colour bands, the store has {}",
            colour_bands
        )));
    }

    let size = tiles.tile_size as usize;
    let bbox = tiles.tile_bbox(&coord);
    let col_off = ((bbox.min_x - grid.geotransform.c) / grid.resolution).round() as i64;
    let row_off = ((grid.geotransform.f - bbox.max_y) / grid.resolution).round() as i64;
    let tile_window = Window::new(col_off, row_off, size, size);

    // Premultiplied RGB plus alpha.
    let mut rgba = RasterBlock::filled(size, size, 4, 0.0);
    if let Some(read) = tile_window.clip(grid.width, grid.height) {
        let pixels = read_level(store, &manifest, &grid, level, &read)?;
        let dc = (read.col_off - col_off) as usize;
        let dr = (read.row_off - row_off) as usize;
        for r in 0..read.height {
            for c in 0..read.width {
                let alpha = if grid.has_alpha {
                    pixels.get(colour_bands, c, r)
                } else if pixels.is_valid(c, r) {
                    255.0
                } else {
                    0.0
                };
                if alpha <= 0.0 {
                    continue;
                }
                for b in 0..3 {
                    let v = pixels.get(b.min(colour_bands - 1), c, r);
                    rgba.set(b, c + dc, r + dr, v);
                }
                rgba.set(3, c + dc, r + dr, alpha);
            }
        }
    }
    debug!(tile = %coord, level = level, background = %background, "Tile read");

    let block = match background {
        Background::Alpha => rgba,
        Background::Rgb(r, g, b) => composite(&rgba, [r, g, b]),
    };
    background.codec().encode(&block, 0)
}

/// Pyramid level whose resolution matches `zoom`.
fn level_for_zoom(manifest: &Manifest, tiles: &TileGrid, zoom: u32) -> Result<(u32, OutputGrid)> {
    let wanted = tiles
        .resolution(zoom)
        .map_err(|e| RasterProcessorError::configuration(e.to_string()))?;
    manifest
        .levels
        .iter()
        .find(|info| {
            tiles.zoom_for_resolution(info.resolution) == zoom
                && (info.resolution - wanted).abs() <= RESOLUTION_TOLERANCE * wanted
        })
        .map(|info| (info.level, manifest.level_grid(info.level)))
        .ok_or_else(|| {
            RasterProcessorError::configuration(format!(
                "zoom {} is not a level of the pyramid ({} levels from zoom {})",
                zoom,
                manifest.levels.len(),
                manifest.grid.zoom
            ))
        })
}

/// Blend premultiplied RGBA over an opaque colour.
fn composite(rgba: &RasterBlock, colour: [u8; 3]) -> RasterBlock {
    let mut out = RasterBlock::filled(rgba.width, rgba.height, 3, 0.0);
    let alpha = rgba.band(3);
    for (b, &bg) in colour.iter().enumerate() {
        let src = rgba.band(b);
        for (i, v) in out.band_mut(b).iter_mut().enumerate() {
            *v = src[i] + f32::from(bg) * (1.0 - alpha[i] / 255.0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resample::ResamplingKernel;
    use crate::store::{BlockKey, MemoryTileStore, RunStatus};
    use ortho_common::{GeoTransform, SpatialRef};

    const Z: u32 = 18;

    /// Two-tile-wide level-0 grid whose origin is the corner of tile
    /// `18/1000/2000`, with an alpha band.
    fn tile_aligned_grid(tiles: &TileGrid) -> OutputGrid {
        let r = tiles.resolution(Z).unwrap();
        let corner = tiles.tile_bbox(&TileCoord::new(Z, 1000, 2000));
        OutputGrid {
            srs: SpatialRef::epsg(3857),
            geotransform: GeoTransform::north_up(corner.min_x, corner.max_y, r, r),
            width: 512,
            height: 256,
            bands: 4,
            has_alpha: true,
            block_size: 256,
            resolution: r,
            zoom: Z,
        }
    }

    /// Store with block (0, 0) opaque grey 100 and block (1, 0) half
    /// transparent red; nothing else.
    fn store() -> MemoryTileStore {
        let tiles = TileGrid::default();
        let grid = tile_aligned_grid(&tiles);
        let store = MemoryTileStore::new();
        let mut manifest = Manifest::new(grid, ResamplingKernel::Bilinear, TileCodec::Raw, None);
        manifest.status = RunStatus::Complete;
        store.write_manifest(&manifest).unwrap();

        let mut grey = RasterBlock::filled(256, 256, 4, 100.0);
        grey.band_mut(3).fill(255.0);
        store
            .write_block(&BlockKey::new(0, 0, 0), &TileCodec::Raw.encode(&grey, 0).unwrap())
            .unwrap();

        let mut red = RasterBlock::filled(256, 256, 4, 0.0);
        red.band_mut(0).fill(200.0);
        red.band_mut(3).fill(128.0);
        store
            .write_block(&BlockKey::new(0, 1, 0), &TileCodec::Raw.encode(&red, 0).unwrap())
            .unwrap();
        store
    }

    fn decode_rgba(bytes: &[u8]) -> image::RgbaImage {
        image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            .unwrap()
            .to_rgba8()
    }

    #[test]
    fn test_stored_block_is_served_as_its_tile() {
        let store = store();
        let png = read_tile(&store, TileCoord::new(Z, 1000, 2000), Background::Alpha).unwrap();
        let img = decode_rgba(&png);
        assert_eq!(img.dimensions(), (256, 256));
        assert!(img.pixels().all(|p| p.0 == [100, 100, 100, 255]));
    }

    #[test]
    fn test_alpha_background_premultiplies() {
        let store = store();
        let png = read_tile(&store, TileCoord::new(Z, 1001, 2000), Background::Alpha).unwrap();
        let img = decode_rgba(&png);
        // 200 * 128 / 255
        assert!(img.pixels().all(|p| p.0 == [100, 0, 0, 128]));
    }

    #[test]
    fn test_rgb_background_fills_missing_pixels() {
        let store = store();
        // Below the stored grid: background only.
        let jpeg = read_tile(&store, TileCoord::new(Z, 1000, 2001), Background::Rgb(0, 0, 255)).unwrap();
        let img = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg)
            .unwrap()
            .to_rgb8();
        assert_eq!(img.dimensions(), (256, 256));
        let p = img.get_pixel(128, 128).0;
        assert!(p[0] < 8 && p[1] < 8 && p[2] > 247, "{:?}", p);

        // Half transparent red over white.
        let jpeg = read_tile(&store, TileCoord::new(Z, 1001, 2000), Background::Rgb(255, 255, 255)).unwrap();
        let img = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg)
            .unwrap()
            .to_rgb8();
        let p = img.get_pixel(128, 128).0;
        assert!((i32::from(p[0]) - 227).abs() <= 3, "{:?}", p);
        assert!((i32::from(p[1]) - 127).abs() <= 3, "{:?}", p);
    }

    #[test]
    fn test_zoom_without_level_is_rejected() {
        let store = store();
        let result = read_tile(&store, TileCoord::new(Z + 1, 2000, 4000), Background::Alpha);
        assert!(matches!(result, Err(RasterProcessorError::Configuration(_))));
        assert!(read_tile(&store, TileCoord::new(2, 9, 0), Background::Alpha).is_err());
    }

    #[test]
    fn test_missing_manifest() {
        let store = MemoryTileStore::new();
        assert!(matches!(
            read_tile(&store, TileCoord::new(Z, 1000, 2000), Background::Alpha),
            Err(RasterProcessorError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_parse_background() {
        assert_eq!("alpha".parse::<Background>().unwrap(), Background::Alpha);
        assert_eq!("255, 255,0".parse::<Background>().unwrap(), Background::Rgb(255, 255, 0));
        assert!("256,0,0".parse::<Background>().is_err());
        assert!("1,2".parse::<Background>().is_err());
        assert_eq!(Background::Rgb(1, 2, 3).to_string(), "1,2,3");
    }
}
