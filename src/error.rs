//! Error types for the export pipeline

use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing, paginating or delivering a report
#[derive(Error, Debug)]
pub enum Error {
    /// The element identifier did not resolve to an element on the surface
    #[error("Element with id \"{0}\" not found")]
    TargetNotFound(String),

    /// Rendering the target into a raster failed
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    /// Zero, negative or non-finite dimensions reached the pagination stage
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Encoding the image or document failed
    #[error("Encoding failed: {0}")]
    EncodeError(String),

    /// The download sink refused or failed to store the artifact
    #[error("Delivery failed: {0}")]
    DeliveryError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a capture retry could plausibly succeed.
    ///
    /// Only rendering failures are transient; a missing target stays missing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::CaptureFailed(_))
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::EncodeError(err.to_string())
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::EncodeError(err.to_string())
    }
}
