//! PNG/JPEG source tiles georeferenced by an ESRI world file.

use image::codecs::jpeg::JpegDecoder;
use image::codecs::png::PngDecoder;
use image::{ColorType, DynamicImage, GenericImageView, ImageDecoder, ImageFormat};
use ortho_common::{GeoTransform, SpatialRef};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::RasterSource;
use crate::error::{RasterProcessorError, Result};
use crate::types::{ByteRaster, RasterBlock, SourcePixels, Window};

/// An 8-bit image file on disk.
///
/// Only the header is read when the source is opened; pixels are decoded on
/// every [`read_window`](RasterSource::read_window) call, so callers should
/// cache the 8-bit [`decode_all`](RasterSource::decode_all) result (the
/// mosaic does). An alpha channel marks validity:
/// pixels with alpha 0 read as nodata and the alpha channel itself is not
/// exposed as a band.
#[derive(Debug, Clone)]
pub struct ImageSource {
    path: PathBuf,
    format: ImageFormat,
    width: usize,
    height: usize,
    color: ColorType,
    geotransform: GeoTransform,
    srs: SpatialRef,
    nodata: Option<f32>,
}

impl ImageSource {
    /// Open an image and its world-file sidecar.
    pub fn open(path: impl AsRef<Path>, srs: SpatialRef) -> Result<Self> {
        let path = path.as_ref();
        let world = find_world_file(path).ok_or_else(|| {
            RasterProcessorError::configuration(format!(
                "no world file found next to {}",
                path.display()
            ))
        })?;
        let geotransform = read_world_file(&world)?;
        Self::with_geotransform(path, geotransform, srs)
    }

    /// Open an image with an explicit geotransform.
    pub fn with_geotransform(
        path: impl AsRef<Path>,
        geotransform: GeoTransform,
        srs: SpatialRef,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let format = ImageFormat::from_path(&path)?;
        let reader = BufReader::new(File::open(&path)?);
        let ((width, height), color) = match format {
            ImageFormat::Png => header(PngDecoder::new(reader)?),
            ImageFormat::Jpeg => header(JpegDecoder::new(reader)?),
            other => {
                return Err(RasterProcessorError::configuration(format!(
                    "unsupported image format {:?} for {}",
                    other,
                    path.display()
                )))
            }
        };

        debug!(
            path = %path.display(),
            width = width,
            height = height,
            color = ?color,
            "Opened image source"
        );

        Ok(Self {
            path,
            format,
            width: width as usize,
            height: height as usize,
            color,
            geotransform,
            srs,
            nodata: None,
        })
    }

    /// Treat pixels whose bands all equal `value` as nodata.
    pub fn with_nodata(mut self, value: f32) -> Self {
        self.nodata = Some(value);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn has_alpha(&self) -> bool {
        self.color.has_alpha()
    }

    /// Decode the whole image into planar bytes.
    fn decode(&self) -> Result<ByteRaster> {
        let img = image::open(&self.path)?;
        let (w, h) = (self.width, self.height);
        let (img_w, img_h) = img.dimensions();
        if (img_w as usize, img_h as usize) != (w, h) {
            return Err(RasterProcessorError::Image(format!(
                "{} changed size since it was opened",
                self.path.display()
            )));
        }

        let bands = self.bands();
        let mut raster = ByteRaster::new(w, h, bands);
        let (samples, channels) = interleaved(&img, bands, self.has_alpha());
        drop(img);
        let n = w * h;
        for i in 0..n {
            let px = &samples[i * channels..(i + 1) * channels];
            if self.has_alpha() && px[channels - 1] == 0 {
                continue;
            }
            let colour = &px[..bands];
            if let Some(nd) = self.nodata {
                if colour.iter().all(|&v| v as f32 == nd) {
                    continue;
                }
            }
            raster.valid[i] = true;
            for (b, &v) in colour.iter().enumerate() {
                raster.data[b * n + i] = v;
            }
        }
        Ok(raster)
    }
}

fn header<'a>(decoder: impl ImageDecoder<'a>) -> ((u32, u32), ColorType) {
    (decoder.dimensions(), decoder.color_type())
}

/// Interleaved 8-bit samples and the channel count per pixel.
fn interleaved(img: &DynamicImage, bands: usize, alpha: bool) -> (Vec<u8>, usize) {
    match (bands, alpha) {
        (1, false) => (img.to_luma8().into_raw(), 1),
        (1, true) => (img.to_luma_alpha8().into_raw(), 2),
        (_, false) => (img.to_rgb8().into_raw(), 3),
        (_, true) => (img.to_rgba8().into_raw(), 4),
    }
}

impl RasterSource for ImageSource {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn bands(&self) -> usize {
        match self.color.channel_count() {
            1 | 2 => 1,
            _ => 3,
        }
    }

    fn geotransform(&self) -> GeoTransform {
        self.geotransform
    }

    fn srs(&self) -> &SpatialRef {
        &self.srs
    }

    fn read_window(&self, window: &Window) -> Result<RasterBlock> {
        Ok(SourcePixels::Bytes(self.decode()?).window(window))
    }

    fn decode_all(&self) -> Result<SourcePixels> {
        Ok(SourcePixels::Bytes(self.decode()?))
    }

    fn description(&self) -> String {
        format!("{} ({:?})", self.path.display(), self.format)
    }
}

/// Locate the world file for an image: `.pgw`/`.pngw` for PNG,
/// `.jgw`/`.jpgw` for JPEG, and `.wld` for either.
pub fn find_world_file(image: &Path) -> Option<PathBuf> {
    let ext = image.extension()?.to_str()?.to_lowercase();
    let candidates: &[&str] = match ext.as_str() {
        "png" => &["pgw", "pngw", "wld"],
        "jpg" | "jpeg" => &["jgw", "jpgw", "wld"],
        _ => &["wld"],
    };
    candidates
        .iter()
        .flat_map(|c| [c.to_string(), c.to_uppercase()])
        .map(|c| image.with_extension(c))
        .find(|p| p.is_file())
}

/// Parse a world file (six numbers A, D, B, E, C, F, one per line).
pub fn read_world_file(path: &Path) -> Result<GeoTransform> {
    let text = std::fs::read_to_string(path)?;
    parse_world_file(&text).map_err(|msg| {
        RasterProcessorError::configuration(format!("{}: {}", path.display(), msg))
    })
}

/// Parse world-file text.
pub fn parse_world_file(text: &str) -> std::result::Result<GeoTransform, String> {
    let values: Vec<f64> = text
        .split_whitespace()
        .map(|t| t.parse::<f64>().map_err(|_| format!("invalid number '{}'", t)))
        .collect::<std::result::Result<_, _>>()?;
    let values: [f64; 6] = values
        .try_into()
        .map_err(|v: Vec<f64>| format!("expected 6 values, found {}", v.len()))?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err("non-finite value".to_string());
    }
    Ok(GeoTransform::from_world_file(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_parse_world_file() {
        let gt = parse_world_file("0.5\n0\n0\n-0.5\n1000.25\n2000.25\n").unwrap();
        assert_eq!(gt.to_gdal(), [1000.0, 0.5, 0.0, 2000.5, 0.0, -0.5]);
        assert!(parse_world_file("1\n0\n0\n-1\n0\n").is_err());
        assert!(parse_world_file("1\n0\n0\n-1\n0\nabc\n").is_err());
    }

    #[test]
    fn test_open_rgb_with_world_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(3, 1, Rgb([10, 20, 30]));
        img.save(&path).unwrap();
        std::fs::write(dir.path().join("tile.pgw"), "2\n0\n0\n-2\n101\n199\n").unwrap();

        let src = ImageSource::open(&path, SpatialRef::epsg(5514)).unwrap();
        assert_eq!((src.width(), src.height(), src.bands()), (4, 2, 3));
        assert_eq!(src.geotransform().to_gdal(), [100.0, 2.0, 0.0, 200.0, 0.0, -2.0]);

        let block = src.read_window(&Window::full(4, 2)).unwrap();
        assert_eq!(block.get(0, 3, 1), 10.0);
        assert_eq!(block.get(2, 3, 1), 30.0);
        assert_eq!(block.get(1, 0, 0), 0.0);
    }

    #[test]
    fn test_alpha_marks_nodata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([50, 60, 70, 255]));
        img.put_pixel(0, 0, Rgba([50, 60, 70, 0]));
        img.save(&path).unwrap();

        let src = ImageSource::with_geotransform(
            &path,
            GeoTransform::north_up(0.0, 2.0, 1.0, 1.0),
            SpatialRef::epsg(3857),
        )
        .unwrap();
        assert_eq!(src.bands(), 3);
        let block = src.read_window(&Window::full(2, 2)).unwrap();
        assert!(!block.is_valid(0, 0));
        assert!(block.is_valid(1, 1));
    }

    #[test]
    fn test_nodata_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("n.png");
        let mut img = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 5, 0]));
        img.save(&path).unwrap();

        let src = ImageSource::with_geotransform(
            &path,
            GeoTransform::north_up(0.0, 1.0, 1.0, 1.0),
            SpatialRef::epsg(3857),
        )
        .unwrap()
        .with_nodata(0.0);
        let block = src.read_window(&Window::full(2, 1)).unwrap();
        assert!(!block.is_valid(0, 0));
        assert!(block.is_valid(1, 0));
    }

    #[test]
    fn test_missing_world_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lonely.jpg");
        RgbImage::new(2, 2).save(&path).unwrap();
        let err = ImageSource::open(&path, SpatialRef::epsg(5514)).unwrap_err();
        assert!(matches!(err, RasterProcessorError::Configuration(_)));
    }
}
