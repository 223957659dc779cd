//! Local index directory error types.

use thiserror::Error;

/// Local index directory operation errors.
#[derive(Debug, Error)]
pub enum LidError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("cursor counter is missing; the store was never initialized")]
    CursorNotInitialized,

    #[error("backend error: {0}")]
    Backend(#[from] wharf_kv::KvError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt index entry: {0}")]
    CorruptIndex(String),

    #[error("validation error: {0}")]
    Validation(String),
}

impl LidError {
    /// Whether this error is a plain missing-entry condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LidError::NotFound(_))
    }
}

/// Result type for local index directory operations.
pub type LidResult<T> = std::result::Result<T, LidError>;
