//! Error types for the tspipe core crate.

use thiserror::Error;

/// Main error type for core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed binary data (bad MJD, bad BCD, short buffer).
    #[error("Format error: {0}")]
    Format(String),

    /// Invalid parameter provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// End of stream reached.
    #[error("End of stream")]
    EndOfStream,

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Create an invalid parameter error.
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Check if this is an end-of-stream error.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
