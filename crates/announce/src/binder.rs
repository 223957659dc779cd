//! Context-id to piece resolution.

use crate::error::{AnnounceError, AnnounceResult};
use crate::ports::MultihashLister;
use async_trait::async_trait;
use cid::Cid;
use cid::multihash::Multihash;
use std::sync::Arc;
use wharf_core::{Deal, DealsDb, LegacyDealsSource, PeerId};
use wharf_lid::LidError;
use wharf_shard::ShardManager;

/// Resolves advertisement context ids (serialized signed-proposal cids)
/// to pieces, and materializes a piece's multihashes for the provider
/// engine.
pub struct DealBinder {
    deals: Arc<dyn DealsDb>,
    legacy: Option<Arc<dyn LegacyDealsSource>>,
    shards: ShardManager,
}

impl DealBinder {
    pub fn new(
        deals: Arc<dyn DealsDb>,
        legacy: Option<Arc<dyn LegacyDealsSource>>,
        shards: ShardManager,
    ) -> Arc<Self> {
        Arc::new(Self {
            deals,
            legacy,
            shards,
        })
    }

    /// Resolve a context id to the piece it advertises: the deals
    /// database first, then the legacy source. A miss on both is
    /// not-found; known pieces must never be blocked by the miss of
    /// another lookup path.
    pub async fn piece_for_context_id(&self, context_id: &[u8]) -> AnnounceResult<Cid> {
        let proposal_cid = Cid::try_from(context_id)
            .map_err(|_| AnnounceError::Validation("context id is not a cid".to_string()))?;

        if let Some(deal) = self.deals.by_signed_proposal_cid(proposal_cid).await? {
            return Ok(deal.piece_cid);
        }

        if let Some(legacy) = &self.legacy {
            if let Some(piece_cid) = legacy.piece_by_proposal_cid(proposal_cid).await? {
                return Ok(piece_cid);
            }
        }

        Err(AnnounceError::NotFound(format!(
            "no deal with proposal cid {proposal_cid}"
        )))
    }

    /// Re-associate a reconstructed deal with its piece. Used by the
    /// disaster-recovery path; re-binding an already bound deal is a
    /// no-op.
    pub async fn bind_deal_to_piece(&self, piece_cid: &Cid, deal: &Deal) -> AnnounceResult<()> {
        match self
            .shards
            .lid()
            .add_deal_for_piece(piece_cid, deal.deal_info())
            .await
        {
            Ok(()) | Err(LidError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MultihashLister for DealBinder {
    async fn list_multihashes(
        &self,
        _peer: &PeerId,
        context_id: &[u8],
    ) -> AnnounceResult<Vec<Multihash<64>>> {
        let piece_cid = self.piece_for_context_id(context_id).await?;
        let index = self
            .shards
            .get_iterable_index_for_piece(&piece_cid)
            .await?;
        Ok(index.multihashes().collect())
    }
}
