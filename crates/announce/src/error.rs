//! Announcement pipeline error types.

use thiserror::Error;

/// Announcement operation errors.
#[derive(Debug, Error)]
pub enum AnnounceError {
    /// The index provider is configured off; no announce operation has
    /// side effects.
    #[error("index announcements are disabled")]
    Disabled,

    /// The engine has already advertised this context id. Bulk callers
    /// swallow this: the desired state is already true.
    #[error("context id already advertised")]
    AlreadyAdvertised,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("provider engine error: {0}")]
    Engine(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("shard error: {0}")]
    Shard(#[from] wharf_shard::ShardError),

    #[error("index directory error: {0}")]
    Lid(#[from] wharf_lid::LidError),

    #[error("collaborator error: {0}")]
    Core(#[from] wharf_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnnounceError {
    /// Whether this is the non-fatal already-advertised sentinel.
    pub fn is_already_advertised(&self) -> bool {
        matches!(self, AnnounceError::AlreadyAdvertised)
    }
}

/// Result type for announcement operations.
pub type AnnounceResult<T> = std::result::Result<T, AnnounceError>;
