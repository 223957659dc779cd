//! Piece metadata, index records, and flagged-piece state.

use crate::deal::DealInfo;
use cid::Cid;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Offset and length of a block within a piece's payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetSize {
    /// Byte offset of the block payload within the piece.
    pub offset: u64,
    /// Length of the block payload in bytes.
    pub size: u64,
}

impl OffsetSize {
    /// Create a new offset/size pair.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }
}

/// A single entry of a piece's block index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Content address of the block.
    pub cid: Cid,
    /// Where the block lives within the piece.
    pub offset_size: OffsetSize,
}

impl Record {
    /// Create a record from a cid and its location.
    pub fn new(cid: Cid, offset: u64, size: u64) -> Self {
        Self {
            cid,
            offset_size: OffsetSize::new(offset, size),
        }
    }
}

/// Write-once index error recorded against a piece.
///
/// The first error reported for a piece is kept; later errors must not
/// overwrite it, so the root cause stays visible.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexError {
    /// Human-readable error message.
    pub message: String,
    /// Stable tag describing the error class (e.g. "corrupt_index").
    pub kind: String,
}

/// Metadata stored against a piece cid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PieceInfo {
    /// Schema version of this record.
    pub version: String,
    /// Key namespace under which the piece's index records live.
    pub cursor: u64,
    /// When the piece's index was last (re)built, if ever.
    #[serde(default)]
    pub indexed_at: Option<OffsetDateTime>,
    /// Whether the index covers every block in the piece.
    #[serde(default)]
    pub complete_index: bool,
    /// Deals referencing this piece.
    #[serde(default)]
    pub deals: Vec<DealInfo>,
    /// First index error reported for this piece, if any.
    #[serde(default)]
    pub error: Option<IndexError>,
}

impl PieceInfo {
    /// Create metadata for a piece that has not been assigned a cursor yet.
    pub fn new() -> Self {
        Self {
            version: crate::PIECE_INFO_VERSION.to_string(),
            cursor: 0,
            indexed_at: None,
            complete_index: false,
            deals: Vec::new(),
            error: None,
        }
    }

    /// Whether the piece has been indexed.
    pub fn is_indexed(&self) -> bool {
        self.indexed_at.is_some()
    }

    /// Find a deal on this piece by its uuid.
    pub fn deal(&self, deal_uuid: Uuid) -> Option<&DealInfo> {
        self.deals.iter().find(|d| d.deal_uuid == deal_uuid)
    }
}

impl Default for PieceInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a piece was flagged by the doctor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    /// The piece's index is missing or unreadable.
    Index,
    /// The piece's sector could not be unsealed.
    Unseal,
}

impl fmt::Display for FlagReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagReason::Index => write!(f, "index"),
            FlagReason::Unseal => write!(f, "unseal"),
        }
    }
}

/// A piece flagged as problematic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlaggedPiece {
    /// The flagged piece.
    pub piece_cid: Cid,
    /// When the flag was first raised.
    pub created_at: OffsetDateTime,
    /// What check failed.
    pub reason: FlagReason,
}

impl FlaggedPiece {
    /// Flag a piece now for the given reason.
    pub fn new(piece_cid: Cid, reason: FlagReason) -> Self {
        Self {
            piece_cid,
            created_at: OffsetDateTime::now_utc(),
            reason,
        }
    }
}
