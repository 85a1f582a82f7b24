//! Error types for raster processing.

use thiserror::Error;

/// Problems with mask geometry that healing could not fix.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// A coordinate is NaN or infinite.
    #[error("non-finite coordinate in ring {ring} of polygon {polygon}")]
    NonFinite { polygon: usize, ring: usize },

    /// The exterior ring of a polygon vanished during healing.
    #[error("polygon {polygon} cannot be healed: {reason}")]
    Unhealable { polygon: usize, reason: String },

    /// A coverage layer (or the whole mask) has no usable polygons.
    #[error("mask geometry is empty: {0}")]
    Empty(String),

    /// Input geometry type or structure is not supported.
    #[error("unsupported geometry: {0}")]
    Unsupported(String),
}

/// Errors that can occur while building mosaics, masks or output pyramids.
#[derive(Error, Debug)]
pub enum RasterProcessorError {
    /// Invalid input combination, detected before any pixel work.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Mask geometry could not be healed.
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Coordinate pipeline could not be built.
    #[error("projection error: {0}")]
    Projection(#[from] projection::ProjectionError),

    /// Reading or writing files failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Tile encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// Source image could not be decoded.
    #[error("image error: {0}")]
    Image(String),

    /// The run was cancelled before this operation started.
    #[error("cancelled")]
    Cancelled,

    /// The store manifest is missing or inconsistent.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

impl RasterProcessorError {
    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an Io error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create a Codec error.
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// True for errors that only affect a single block of a run.
    pub fn is_block_local(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Codec(_) | Self::Image(_))
    }
}

impl From<std::io::Error> for RasterProcessorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<image::ImageError> for RasterProcessorError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err.to_string())
    }
}

impl From<serde_json::Error> for RasterProcessorError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidManifest(err.to_string())
    }
}

/// Result type for raster processor operations.
pub type Result<T> = std::result::Result<T, RasterProcessorError>;
