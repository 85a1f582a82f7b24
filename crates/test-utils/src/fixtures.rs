//! On-disk fixtures: georeferenced images and GeoJSON coverage layers.

use image::{ImageBuffer, Luma, Rgb, Rgba};
use ortho_common::GeoTransform;
use std::path::{Path, PathBuf};

use crate::generators::to_interleaved_u8;

/// Text of an ESRI world file for `gt`.
///
/// World files reference the centre of the top-left pixel, so the origin is
/// shifted by half a pixel.
pub fn world_file_text(gt: &GeoTransform) -> String {
    let (cx, cy) = gt.pixel_to_geo(0.5, 0.5);
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}\n",
        gt.a, gt.d, gt.b, gt.e, cx, cy
    )
}

/// Write planar `data` as `<dir>/<name>.png` plus a `.pgw` world file.
///
/// `bands` selects the colour type: 1 grey, 3 RGB, 4 RGBA.
pub fn write_world_png(
    dir: &Path,
    name: &str,
    data: &[f32],
    width: usize,
    height: usize,
    bands: usize,
    gt: &GeoTransform,
) -> PathBuf {
    let path = dir.join(format!("{}.png", name));
    let bytes = to_interleaved_u8(data, width, height, bands);
    let (w, h) = (width as u32, height as u32);
    match bands {
        1 => ImageBuffer::<Luma<u8>, _>::from_raw(w, h, bytes)
            .expect("buffer size")
            .save(&path),
        3 => ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, bytes)
            .expect("buffer size")
            .save(&path),
        4 => ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, bytes)
            .expect("buffer size")
            .save(&path),
        other => panic!("unsupported band count {}", other),
    }
    .expect("Failed to write test image");

    std::fs::write(dir.join(format!("{}.pgw", name)), world_file_text(gt))
        .expect("Failed to write world file");
    path
}

/// A GeoJSON feature collection of axis-aligned rectangles
/// `(min_x, min_y, max_x, max_y)`.
pub fn rectangles_geojson(rects: &[(f64, f64, f64, f64)]) -> String {
    let features: Vec<String> = rects
        .iter()
        .map(|&(x0, y0, x1, y1)| {
            format!(
                r#"{{"type":"Feature","properties":{{}},"geometry":{{"type":"Polygon","coordinates":[[[{x0},{y0}],[{x1},{y0}],[{x1},{y1}],[{x0},{y1}],[{x0},{y0}]]]}}}}"#
            )
        })
        .collect();
    format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        features.join(",")
    )
}

/// Write [`rectangles_geojson`] to `<dir>/<name>.geojson`.
pub fn write_rectangles_geojson(dir: &Path, name: &str, rects: &[(f64, f64, f64, f64)]) -> PathBuf {
    let path = dir.join(format!("{}.geojson", name));
    std::fs::write(&path, rectangles_geojson(rects)).expect("Failed to write GeoJSON");
    path
}
