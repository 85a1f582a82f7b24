//! Properties of kernels and block partitions.

use ortho_common::{GeoTransform, SpatialRef};
use proptest::prelude::*;
use raster_processor::{OutputGrid, RasterBlock, ResamplingKernel};

fn kernel() -> impl Strategy<Value = ResamplingKernel> {
    prop_oneof![
        Just(ResamplingKernel::Nearest),
        Just(ResamplingKernel::Bilinear),
        Just(ResamplingKernel::Cubic),
        Just(ResamplingKernel::Lanczos),
    ]
}

proptest! {
    #[test]
    fn constant_block_samples_to_constant(
        kernel in kernel(),
        x in 12.0..20.0_f64,
        y in 12.0..20.0_f64,
        sx in 1.0..2.0_f64,
        sy in 1.0..2.0_f64,
        value in 0.0..255.0_f32,
    ) {
        let block = RasterBlock::filled(32, 32, 2, value);
        let mut out = [0.0_f32; 2];
        prop_assert!(kernel.sample(&block, x, y, (sx, sy), &mut out));
        for v in out {
            prop_assert!((v - value).abs() < 1e-3, "{} sampled {} from {}", kernel, v, value);
        }
    }

    #[test]
    fn blocks_partition_the_grid(
        width in 1usize..700,
        height in 1usize..700,
        block_size in 1usize..300,
    ) {
        let grid = OutputGrid {
            srs: SpatialRef::epsg(3857),
            geotransform: GeoTransform::north_up(0.0, 0.0, 1.0, 1.0),
            width,
            height,
            bands: 4,
            has_alpha: true,
            block_size,
            resolution: 1.0,
            zoom: 0,
        };

        let mut covered = 0;
        for (col, row) in grid.blocks() {
            let w = grid.block_window(col, row);
            prop_assert!(!w.is_empty());
            prop_assert!(w.col_end() <= width as i64 && w.row_end() <= height as i64);
            covered += w.pixel_count();
        }
        prop_assert_eq!(covered, width * height);
        prop_assert_eq!(grid.blocks().len(), grid.block_count());
    }
}
