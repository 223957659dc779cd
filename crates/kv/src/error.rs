//! Key-value adapter error types.

use thiserror::Error;

/// Key-value adapter operation errors.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("backend error: {0}")]
    Backend(#[from] rocksdb::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for key-value operations.
pub type KvResult<T> = std::result::Result<T, KvError>;
