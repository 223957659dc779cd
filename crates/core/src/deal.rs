//! Deal records and the deal checkpoint lifecycle.

use cid::Cid;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a deal.
///
/// The ordering matters: the core only acts on deals at or after
/// [`Checkpoint::IndexedAndAnnounced`] and before [`Checkpoint::Complete`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    Proposed,
    Accepted,
    Transferred,
    Published,
    Sealing,
    IndexedAndAnnounced,
    Complete,
}

impl Checkpoint {
    /// Whether a deal at this checkpoint is eligible for announcement
    /// and shard registration.
    pub fn is_announceable(&self) -> bool {
        *self >= Checkpoint::IndexedAndAnnounced && *self < Checkpoint::Complete
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Checkpoint::Proposed => "proposed",
            Checkpoint::Accepted => "accepted",
            Checkpoint::Transferred => "transferred",
            Checkpoint::Published => "published",
            Checkpoint::Sealing => "sealing",
            Checkpoint::IndexedAndAnnounced => "indexed_and_announced",
            Checkpoint::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// The slice of a deal that the piece directory persists against a piece.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealInfo {
    /// Unique deal identifier.
    pub deal_uuid: Uuid,
    /// Whether the deal came in through the legacy market.
    pub is_legacy: bool,
    /// On-chain deal id.
    pub chain_deal_id: u64,
    /// Sector holding the piece.
    pub sector_id: u64,
    /// Byte offset of the piece within the sector.
    pub piece_offset: u64,
    /// Padded length of the piece within the sector.
    pub piece_length: u64,
    /// Length of the CAR payload inside the piece.
    pub car_length: u64,
}

/// A deal as supplied by the deals database.
///
/// Deals are read-only inputs to the core; the only mutation is binding
/// them to pieces in the local index directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub deal_uuid: Uuid,
    /// Cid of the signed deal proposal; serialized, it is the context id
    /// under which the deal is advertised.
    pub signed_proposal_cid: Cid,
    pub piece_cid: Cid,
    pub is_legacy: bool,
    pub chain_deal_id: u64,
    pub sector_id: u64,
    pub piece_offset: u64,
    pub piece_length: u64,
    pub checkpoint: Checkpoint,
    /// Whether the provider keeps an unsealed copy for fast retrieval.
    #[serde(default)]
    pub fast_retrieval: bool,
    /// Whether the deal is verified on chain.
    #[serde(default)]
    pub verified: bool,
}

impl Deal {
    /// The piece-directory slice of this deal.
    pub fn deal_info(&self) -> DealInfo {
        DealInfo {
            deal_uuid: self.deal_uuid,
            is_legacy: self.is_legacy,
            chain_deal_id: self.chain_deal_id,
            sector_id: self.sector_id,
            piece_offset: self.piece_offset,
            piece_length: self.piece_length,
            car_length: self.piece_length,
        }
    }

    /// The advertisement context id for this deal.
    pub fn context_id(&self) -> Vec<u8> {
        self.signed_proposal_cid.to_bytes()
    }
}
