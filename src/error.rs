//! Error types for the grid and storage layer

use thiserror::Error;

/// Result type alias for grid and storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while validating layouts or persisting state
#[derive(Error, Debug)]
pub enum Error {
    /// Nothing is stored under the requested key
    #[error("No data stored under key: {0}")]
    NotFound(String),

    /// Stored data could not be reassembled or decoded
    #[error("Failed to parse stored data: {0}")]
    ParseError(String),

    /// The storage backend rejected a call (quota exceeded, I/O failure, ...)
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Invalid grid position, size, widget type or widget content
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ParseError(err.to_string())
    }
}

impl Error {
    /// Whether this error means "no data" rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
