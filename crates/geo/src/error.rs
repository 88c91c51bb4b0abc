//! Error types for the geo crate.

use thiserror::Error;

/// Result type alias for geo operations.
pub type Result<T> = std::result::Result<T, GeoError>;

/// Errors that can occur during geo operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    /// A coordinate contained NaN or an infinity
    #[error("Non-finite coordinate: ({latitude}, {longitude})")]
    NonFiniteCoordinate {
        /// Offending latitude
        latitude: f64,
        /// Offending longitude
        longitude: f64,
    },

    /// Grid cell size must be a positive, finite number of degrees
    #[error("Invalid grid size: {0}")]
    InvalidGridSize(f64),

    /// Join parameters are unusable
    #[error("Invalid proximity parameters: {0}")]
    InvalidParams(String),
}

/// Error code for integration with proximity-core error handling.
/// Range: 10xxx for geo errors.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoErrorCode {
    /// Non-finite coordinate
    NonFiniteCoordinate = 10001,
    /// Invalid grid size
    InvalidGridSize = 10002,
    /// Invalid parameters
    InvalidParams = 10003,
}

impl GeoError {
    /// Returns the error code for this error.
    pub fn code(&self) -> GeoErrorCode {
        match self {
            GeoError::NonFiniteCoordinate { .. } => GeoErrorCode::NonFiniteCoordinate,
            GeoError::InvalidGridSize(_) => GeoErrorCode::InvalidGridSize,
            GeoError::InvalidParams(_) => GeoErrorCode::InvalidParams,
        }
    }
}
