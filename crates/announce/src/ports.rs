//! Provider engine and mesh ports.
//!
//! The provider engine owns the gossip channel to the network indexer
//! and the advertisement chain; the mesh creator maintains the publish
//! mesh connection. Both are external subsystems.

use crate::ad::Advertisement;
use crate::error::AnnounceResult;
use crate::metadata::TransportMetadata;
use async_trait::async_trait;
use cid::Cid;
use cid::multihash::Multihash;
use std::sync::Arc;
use wharf_core::PeerId;

/// Materializes the multihashes behind an advertisement's context id.
#[async_trait]
pub trait MultihashLister: Send + Sync {
    async fn list_multihashes(
        &self,
        peer: &PeerId,
        context_id: &[u8],
    ) -> AnnounceResult<Vec<Multihash<64>>>;
}

/// The underlying index-provider engine.
///
/// `notify_put` is idempotent per context id: re-announcing an already
/// advertised context id fails with the already-advertised sentinel.
#[async_trait]
pub trait ProviderEngine: Send + Sync {
    /// Announce that the provider serves the multihashes behind
    /// `context_id` under the given transport metadata. Returns the cid
    /// of the published advertisement.
    async fn notify_put(
        &self,
        provider: Option<PeerId>,
        context_id: &[u8],
        metadata: TransportMetadata,
    ) -> AnnounceResult<Cid>;

    /// The head of the provider's advertisement chain, if any.
    async fn get_latest_adv(&self) -> AnnounceResult<Option<(Cid, Advertisement)>>;

    /// Publish a fully built advertisement. Returns its cid.
    async fn publish(&self, ad: Advertisement) -> AnnounceResult<Cid>;

    /// Install the callback used to materialize an advertisement's
    /// multihash iterator.
    fn register_multihash_lister(&self, lister: Arc<dyn MultihashLister>);
}

/// Maintains the connection into the publish mesh so gossiped
/// announcements reach the indexer network.
#[async_trait]
pub trait MeshCreator: Send + Sync {
    async fn connect(&self) -> AnnounceResult<()>;
}
