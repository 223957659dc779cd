//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid content address: {0}")]
    InvalidCid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by an external collaborator (deals database,
    /// sector accessor).
    #[error("collaborator error: {0}")]
    External(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
