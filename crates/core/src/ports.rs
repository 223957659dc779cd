//! Collaborator ports consumed by the core.
//!
//! The deals database, the legacy deals source, and the sector accessor
//! are external subsystems; the core only ever sees these traits.

use crate::deal::Deal;
use crate::error::Result;
use async_trait::async_trait;
use cid::Cid;
use tokio::io::AsyncRead;

/// Reader over a sector's unsealed bytes.
pub type SectorReader = Box<dyn AsyncRead + Send + Unpin>;

/// Read access to the provider's deals database.
#[async_trait]
pub trait DealsDb: Send + Sync {
    /// All deals that are still being serviced.
    async fn list_active(&self) -> Result<Vec<Deal>>;

    /// Look up a deal by the cid of its signed proposal.
    ///
    /// Returns `Ok(None)` when no such deal exists.
    async fn by_signed_proposal_cid(&self, proposal_cid: Cid) -> Result<Option<Deal>>;

    /// Look up a deal by its on-chain deal id.
    async fn by_chain_deal_id(&self, chain_deal_id: u64) -> Result<Option<Deal>>;
}

/// Deals made before the current market subsystem existed.
///
/// Consulted only when the deals database has no match for a proposal cid.
#[async_trait]
pub trait LegacyDealsSource: Send + Sync {
    /// Resolve a legacy deal's piece cid by its proposal cid.
    async fn piece_by_proposal_cid(&self, proposal_cid: Cid) -> Result<Option<Cid>>;
}

/// Access to sealed sector data.
///
/// The core never seals, unseals, or transfers sector bytes itself.
#[async_trait]
pub trait SectorAccessor: Send + Sync {
    /// Whether an unsealed copy of the given range exists.
    async fn is_unsealed(&self, sector_id: u64, offset: u64, size: u64) -> Result<bool>;

    /// Obtain a reader over the unsealed range.
    async fn unseal_sector(&self, sector_id: u64, offset: u64, size: u64)
    -> Result<SectorReader>;
}
