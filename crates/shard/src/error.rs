//! Shard manager error types.

use thiserror::Error;

/// Shard lifecycle operation errors.
#[derive(Debug, Error)]
pub enum ShardError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("index directory error: {0}")]
    Lid(#[from] wharf_lid::LidError),

    #[error("sector accessor error: {0}")]
    Accessor(#[from] wharf_core::Error),

    #[error("corrupt piece payload: {0}")]
    CorruptPayload(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShardError {
    /// Stable tag for persisting this error class against a piece.
    pub fn kind(&self) -> &'static str {
        match self {
            ShardError::NotFound(_) => "not_found",
            ShardError::Lid(e) if e.is_not_found() => "not_found",
            ShardError::Lid(_) => "backend",
            ShardError::Accessor(_) => "accessor",
            ShardError::CorruptPayload(_) => "corrupt_index",
            ShardError::Timeout(_) => "timeout",
            ShardError::Cancelled => "cancelled",
            ShardError::Io(_) => "io",
        }
    }
}

/// Result type for shard operations.
pub type ShardResult<T> = std::result::Result<T, ShardError>;
