//! Coordinate reference system transformations.
//!
//! Implements the projection and datum steps of a coordinate pipeline from
//! scratch. A [`CoordinatePipeline`] is an ordered list of [`Step`]s, each
//! invertible on its own; the pipeline runs them left to right on
//! [`forward`](CoordinatePipeline::forward) and right to left, inverted, on
//! [`inverse`](CoordinatePipeline::inverse).
//!
//! Angular coordinates are degrees (longitude, latitude), linear ones meters.
//! Steps never panic on bad input: points outside a step's domain come back
//! as non-finite coordinates.
//!
//! ```
//! use projection::{CoordinatePipeline, Coord, NoGrids};
//!
//! let pipeline = CoordinatePipeline::parse("+proj=webmerc +ellps=WGS84", &NoGrids).unwrap();
//! let xy = pipeline.forward(Coord::new(17.1, 48.15, 0.0));
//! let back = pipeline.inverse(xy);
//! assert!((back.x - 17.1).abs() < 1e-9);
//! ```

pub mod coord;
pub mod ellipsoid;
pub mod error;
mod numeric;
pub mod pipeline;
pub mod steps;

pub use coord::Coord;
pub use ellipsoid::Ellipsoid;
pub use error::{ProjectionError, Result};
pub use pipeline::CoordinatePipeline;
pub use steps::gridshift::{
    DirectoryGridResolver, GridResolver, MemoryGridResolver, NoGrids, ShiftGrid,
};
pub use steps::{
    Geocentric, GridShift, Helmert, HelmertConvention, Krovak, LambertConformal, Step, StepKind,
    TransverseMercator, WebMercator,
};
