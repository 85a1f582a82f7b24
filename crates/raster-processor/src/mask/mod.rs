//! Vector coverage masks and their rasterization to alpha.
//!
//! A [`VectorMask`] is a list of coverage layers. Each layer is the union of
//! its polygons; the mask is the intersection of its layers, so a pixel is
//! inside only when it is inside every layer. This expresses "dissolve the
//! photography cycles, intersect with the tile footprints" without producing
//! any vector geometry.
//!
//! Convention: inside the coverage burns [`MaskOptions::inside_value`]
//! (255, opaque); outside burns [`MaskOptions::outside_value`] (0,
//! transparent). `invert` swaps the two.

pub mod geojson;
pub mod heal;
pub mod rasterize;

use ortho_common::{BoundingBox, GeoTransform, SpatialRef};
use serde::{Deserialize, Serialize};
use tracing::info;

use self::heal::{heal_polygon, OrientedRing};
use self::rasterize::LayerEdges;
use crate::error::{GeometryError, RasterProcessorError, Result};
use crate::source::RasterSource;
use crate::types::{RasterBlock, Window};

/// A ring of `[x, y]` vertices; closing the ring explicitly is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring(pub Vec<[f64; 2]>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Ring,
    #[serde(default)]
    pub holes: Vec<Ring>,
}

impl Polygon {
    pub fn new(exterior: Ring, holes: Vec<Ring>) -> Self {
        Self { exterior, holes }
    }
}

/// Polygons whose union is the covered area.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageLayer {
    pub polygons: Vec<Polygon>,
}

impl CoverageLayer {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }
}

/// Coverage layers in one spatial reference; their intersection is valid.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMask {
    srs: SpatialRef,
    layers: Vec<CoverageLayer>,
}

impl VectorMask {
    pub fn new(srs: SpatialRef, layers: Vec<CoverageLayer>) -> Self {
        Self { srs, layers }
    }

    pub fn srs(&self) -> &SpatialRef {
        &self.srs
    }

    pub fn layers(&self) -> &[CoverageLayer] {
        &self.layers
    }

    /// Heal every polygon of every layer.
    ///
    /// Fails when the mask has no layers, a layer has no polygons left, or
    /// a polygon cannot be healed.
    pub fn heal(&self) -> std::result::Result<Vec<Vec<OrientedRing>>, GeometryError> {
        if self.layers.is_empty() {
            return Err(GeometryError::Empty("mask has no coverage layers".to_string()));
        }
        self.layers
            .iter()
            .enumerate()
            .map(|(l, layer)| {
                if layer.is_empty() {
                    return Err(GeometryError::Empty(format!("layer {} has no polygons", l)));
                }
                let mut rings = Vec::new();
                for (p, polygon) in layer.polygons.iter().enumerate() {
                    rings.extend(heal_polygon(polygon, p)?);
                }
                Ok(rings)
            })
            .collect()
    }

    /// Ground extent of all exterior rings.
    pub fn bounds(&self) -> BoundingBox {
        let mut bbox = BoundingBox::empty();
        for polygon in self.layers.iter().flat_map(|l| &l.polygons) {
            for &[x, y] in &polygon.exterior.0 {
                if x.is_finite() && y.is_finite() {
                    bbox.extend(x, y);
                }
            }
        }
        bbox
    }
}

/// Burn values and grid handling for [`MaskRasterizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskOptions {
    /// Value of pixels outside the coverage.
    pub outside_value: u8,
    /// Value of pixels inside the coverage.
    pub inside_value: u8,
    /// Swap inside and outside.
    pub invert: bool,
    /// Snap a requested extent outward to whole multiples of the pixel size.
    pub align_to_grid: bool,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self {
            outside_value: 0,
            inside_value: 255,
            invert: false,
            align_to_grid: true,
        }
    }
}

/// Pixel grid `(geotransform, width, height)` covering `extent` at
/// `resolution`.
///
/// With `align` the grid edges are whole multiples of the resolution, so
/// masks built for neighbouring extents share pixel boundaries.
pub fn grid_for_extent(
    extent: &BoundingBox,
    resolution: f64,
    align: bool,
) -> Result<(GeoTransform, usize, usize)> {
    if !(resolution.is_finite() && resolution > 0.0) {
        return Err(RasterProcessorError::configuration(format!(
            "mask resolution must be positive, got {}",
            resolution
        )));
    }
    if !extent.is_valid() {
        return Err(RasterProcessorError::configuration("mask extent is empty"));
    }
    if align {
        let (snapped, [ix_min, iy_min, ix_max, iy_max]) = extent.snap_outward(resolution);
        let gt = GeoTransform::north_up(snapped.min_x, snapped.max_y, resolution, resolution);
        Ok((gt, (ix_max - ix_min) as usize, (iy_max - iy_min) as usize))
    } else {
        let gt = GeoTransform::north_up(extent.min_x, extent.max_y, resolution, resolution);
        let width = (extent.width() / resolution).ceil() as usize;
        let height = (extent.height() / resolution).ceil() as usize;
        Ok((gt, width, height))
    }
}

/// Burns a [`VectorMask`] into an [`AlphaRaster`].
#[derive(Debug, Clone, Default)]
pub struct MaskRasterizer {
    options: MaskOptions,
}

impl MaskRasterizer {
    pub fn new(options: MaskOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MaskOptions {
        &self.options
    }

    /// Heal the mask and prepare it for burning on the given grid.
    ///
    /// Pixels are burned lazily, one window at a time.
    pub fn rasterize(
        &self,
        mask: &VectorMask,
        geotransform: GeoTransform,
        width: usize,
        height: usize,
    ) -> Result<AlphaRaster> {
        if width == 0 || height == 0 {
            return Err(RasterProcessorError::configuration("mask grid has no pixels"));
        }
        let healed = mask.heal()?;
        let layers = healed
            .iter()
            .map(|rings| LayerEdges::new(rings, &geotransform))
            .collect::<Result<Vec<_>>>()?;

        info!(
            layers = layers.len(),
            rings = healed.iter().map(Vec::len).sum::<usize>(),
            width = width,
            height = height,
            invert = self.options.invert,
            "Prepared alpha mask"
        );

        Ok(AlphaRaster {
            srs: mask.srs().clone(),
            geotransform,
            width,
            height,
            layers,
            options: self.options,
        })
    }

    /// Rasterize onto a grid covering `extent` at `resolution`, snapped when
    /// [`MaskOptions::align_to_grid`] is set.
    pub fn rasterize_extent(
        &self,
        mask: &VectorMask,
        extent: &BoundingBox,
        resolution: f64,
    ) -> Result<AlphaRaster> {
        let (gt, width, height) = grid_for_extent(extent, resolution, self.options.align_to_grid)?;
        self.rasterize(mask, gt, width, height)
    }

    /// Rasterize onto exactly the pixel grid of `source`.
    pub fn rasterize_for(&self, mask: &VectorMask, source: &dyn RasterSource) -> Result<AlphaRaster> {
        if mask.srs() != source.srs() {
            return Err(RasterProcessorError::configuration(format!(
                "mask is in {}, raster is in {}",
                mask.srs(),
                source.srs()
            )));
        }
        self.rasterize(mask, source.geotransform(), source.width(), source.height())
    }
}

/// A single-band 8-bit mask raster, burned on demand.
#[derive(Debug, Clone)]
pub struct AlphaRaster {
    srs: SpatialRef,
    geotransform: GeoTransform,
    width: usize,
    height: usize,
    layers: Vec<LayerEdges>,
    options: MaskOptions,
}

impl AlphaRaster {
    /// Burn a window; pixels outside the raster get the outside value.
    pub fn burn(&self, window: &Window) -> Vec<u8> {
        let (inside_value, outside_value) = if self.options.invert {
            (self.options.outside_value, self.options.inside_value)
        } else {
            (self.options.inside_value, self.options.outside_value)
        };

        let full = Window::full(self.width, self.height);
        let mut out = vec![outside_value; window.pixel_count()];
        let Some(visible) = window.intersection(&full) else {
            return out;
        };

        let mut inside = vec![true; visible.width];
        for row in visible.row_off..visible.row_end() {
            inside.fill(true);
            for layer in &self.layers {
                layer.intersect_row(row, visible.col_off, &mut inside);
            }
            let out_row = (row - window.row_off) as usize;
            let out_col = (visible.col_off - window.col_off) as usize;
            let start = out_row * window.width + out_col;
            for (dst, &is_inside) in out[start..start + visible.width].iter_mut().zip(&inside) {
                *dst = if is_inside { inside_value } else { outside_value };
            }
        }
        out
    }

    pub fn options(&self) -> &MaskOptions {
        &self.options
    }
}

impl RasterSource for AlphaRaster {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn bands(&self) -> usize {
        1
    }

    fn geotransform(&self) -> GeoTransform {
        self.geotransform
    }

    fn srs(&self) -> &SpatialRef {
        &self.srs
    }

    /// Pixels outside the raster read as nodata, not as outside value.
    fn read_window(&self, window: &Window) -> Result<RasterBlock> {
        let burned = self.burn(window);
        let mut block = RasterBlock::nodata(window.width, window.height, 1);
        let full = Window::full(self.width, self.height);
        if let Some(visible) = window.intersection(&full) {
            for row in visible.row_off..visible.row_end() {
                for col in visible.col_off..visible.col_end() {
                    let c = (col - window.col_off) as usize;
                    let r = (row - window.row_off) as usize;
                    block.set(0, c, r, burned[r * window.width + c] as f32);
                }
            }
        }
        Ok(block)
    }

    fn description(&self) -> String {
        format!("alpha mask ({} layers)", self.layers.len())
    }
}
