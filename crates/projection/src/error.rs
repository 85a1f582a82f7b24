//! Error types for coordinate pipelines.

use thiserror::Error;

/// Errors raised while building a coordinate pipeline.
///
/// Transforming individual points never fails; out-of-domain points are
/// reported as non-finite coordinates instead.
#[derive(Error, Debug)]
pub enum ProjectionError {
    /// A step parameter is missing, malformed or out of range.
    #[error("invalid parameter for step '{step}': {message}")]
    InvalidParameter { step: String, message: String },

    /// The step cannot be inverted with the given parameters.
    #[error("step '{0}' is not invertible")]
    NonInvertible(String),

    /// The pipeline names a step kind this crate does not implement.
    #[error("unknown step '{0}'")]
    UnknownStep(String),

    /// The ellipsoid name is not known.
    #[error("unknown ellipsoid '{0}'")]
    UnknownEllipsoid(String),

    /// The pipeline string could not be tokenized.
    #[error("failed to parse pipeline: {0}")]
    Parse(String),

    /// A datum grid could not be found, read or validated.
    #[error("grid shift error: {0}")]
    GridShift(String),
}

impl ProjectionError {
    pub(crate) fn invalid(step: &str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            step: step.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for pipeline construction.
pub type Result<T> = std::result::Result<T, ProjectionError>;
