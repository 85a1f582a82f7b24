//! Common types shared across the ortho-warp crates.

pub mod bbox;
pub mod geotransform;
pub mod srs;
pub mod tile;

pub use bbox::BoundingBox;
pub use geotransform::{GeoTransform, GeoTransformError};
pub use srs::{SpatialRef, SrsCode, SrsParseError};
pub use tile::{TileCoord, TileGrid, TileGridError, EARTH_RADIUS, MAX_ZOOM};
