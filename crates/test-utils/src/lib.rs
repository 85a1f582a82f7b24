//! Test helpers shared by the ortho-warp crates.
//!
//! Planar `f32` raster generators, PNG + world file fixtures, GeoJSON
//! coverage layers and temporary store directories.
//!
//! ```ignore
//! use test_utils::{ramp, write_world_png, assert_approx_eq};
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Assert `|left - right| <= epsilon`, comparing as `f64`.
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let (left, right) = ($left as f64, $right as f64);
        let epsilon = $epsilon as f64;
        if (left - right).abs() > epsilon {
            panic!(
                "values differ by more than {}: {} vs {}",
                epsilon, left, right
            );
        }
    }};
}
