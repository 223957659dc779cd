//! Peer identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of a peer on the retrieval network.
///
/// Derived from a verifying key by the signing layer; treated as an
/// opaque string everywhere else.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an already-encoded peer id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The encoded form of the peer id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
