//! The announcer: deal-level and provider-level advertisements.

use crate::ad::AdBuilder;
use crate::binder::DealBinder;
use crate::error::{AnnounceError, AnnounceResult};
use crate::keys::{HostIdentity, Keypair};
use crate::metadata::{RetrievalProtocol, TransportMetadata};
use crate::ports::{MeshCreator, ProviderEngine};
use cid::Cid;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;
use wharf_core::config::AppConfig;
use wharf_core::{Deal, DealsDb, PeerId};

/// One deal that failed to announce during a bulk pass.
#[derive(Debug)]
pub struct DealAnnounceFailure {
    pub deal_uuid: Uuid,
    pub error: AnnounceError,
}

/// Outcome of a bulk announcement pass.
#[derive(Debug, Default)]
pub struct AnnounceSummary {
    /// Deals whose desired advertisement state now holds.
    pub advertised: usize,
    /// Distinct pieces those deals cover.
    pub pieces: usize,
    /// Per-deal failures; already-advertised never appears here.
    pub failures: Vec<DealAnnounceFailure>,
}

impl fmt::Display for AnnounceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} deals advertised across {} pieces ({} failed)",
            self.advertised,
            self.pieces,
            self.failures.len()
        )
    }
}

/// Publishes deal and provider-level advertisements through the
/// provider engine.
pub struct Announcer {
    enabled: bool,
    deals: Arc<dyn DealsDb>,
    engine: Arc<dyn ProviderEngine>,
    mesh: Arc<dyn MeshCreator>,
    host: HostIdentity,
    bitswap_peer: Option<PeerId>,
    bitswap_addrs: Vec<String>,
    bitswap_key: Option<Keypair>,
    binder: Arc<DealBinder>,
}

impl Announcer {
    /// Wire up the announcer from configuration. The block-exchange
    /// signing key is loaded eagerly when the endpoint is publicly
    /// reachable, so a bad key file fails at startup rather than at
    /// publish time.
    pub fn new(
        config: &AppConfig,
        host: HostIdentity,
        deals: Arc<dyn DealsDb>,
        engine: Arc<dyn ProviderEngine>,
        mesh: Arc<dyn MeshCreator>,
        binder: Arc<DealBinder>,
    ) -> AnnounceResult<Self> {
        let bitswap_key = if config.bitswap.publicly_reachable() {
            let path = config.bitswap.priv_key_file.as_ref().ok_or_else(|| {
                AnnounceError::Validation(
                    "bitswap.public_addrs requires bitswap.priv_key_file".to_string(),
                )
            })?;
            Some(Keypair::load_from_file(path)?)
        } else {
            None
        };

        Ok(Self {
            enabled: config.announce_enabled,
            deals,
            engine,
            mesh,
            host,
            bitswap_peer: config.bitswap.peer_id.clone().map(PeerId::new),
            bitswap_addrs: config.bitswap.public_addrs.clone(),
            bitswap_key,
            binder,
        })
    }

    /// Whether announcements are configured on.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Install the deal binder as the engine's multihash lister.
    pub fn start(&self) {
        self.engine.register_multihash_lister(self.binder.clone());
    }

    /// Advertise one deal to the network indexer. Returns the cid of
    /// the advertisement.
    pub async fn announce_deal(&self, deal: &Deal) -> AnnounceResult<Cid> {
        if !self.enabled {
            return Err(AnnounceError::Disabled);
        }

        let metadata = TransportMetadata::new(vec![RetrievalProtocol::PieceTransfer {
            piece_cid: deal.piece_cid,
            fast_retrieval: deal.fast_retrieval,
            verified_deal: deal.verified,
        }]);

        // Gossiped announcements only propagate once we sit in the
        // publish mesh; a failed connect degrades propagation but must
        // not fail the announcement.
        if let Err(e) = self.mesh.connect().await {
            tracing::error!(error = %e, "failed to connect to publish mesh");
        }

        self.engine
            .notify_put(None, &deal.context_id(), metadata)
            .await
    }

    /// Advertise every active deal inside the announceable checkpoint
    /// window, accumulating per-deal failures instead of aborting.
    pub async fn announce_all_deals(&self) -> AnnounceResult<AnnounceSummary> {
        if !self.enabled {
            return Err(AnnounceError::Disabled);
        }

        tracing::info!("announcing all active deals to the indexer");
        let deals = self.deals.list_active().await?;

        let mut summary = AnnounceSummary::default();
        let mut pieces = HashSet::new();
        for deal in &deals {
            // Deals below the window will announce on their own later in
            // their lifecycle; deals at or past complete are no longer
            // being serviced.
            if !deal.checkpoint.is_announceable() {
                continue;
            }

            match self.announce_deal(deal).await {
                Ok(_) => {
                    summary.advertised += 1;
                    pieces.insert(deal.piece_cid);
                }
                Err(e) if e.is_already_advertised() => {
                    tracing::info!(deal = %deal.deal_uuid, "deal already advertised");
                    summary.advertised += 1;
                    pieces.insert(deal.piece_cid);
                }
                Err(e) => {
                    tracing::error!(deal = %deal.deal_uuid, error = %e, "failed to announce deal");
                    summary.failures.push(DealAnnounceFailure {
                        deal_uuid: deal.deal_uuid,
                        error: e,
                    });
                }
            }
        }
        summary.pieces = pieces.len();

        tracing::info!(
            advertised = summary.advertised,
            pieces = summary.pieces,
            failed = summary.failures.len(),
            "finished announcing deals"
        );
        Ok(summary)
    }

    /// Publish the provider-level extended-providers record.
    ///
    /// Returns `Ok(None)` when the block exchange is not configured;
    /// that is the expected idle state, not an error. When the
    /// endpoint is publicly reachable its entry is signed with its own
    /// key; otherwise only the protocol marker rides along as generic
    /// metadata.
    pub async fn announce_extended_providers(&self) -> AnnounceResult<Option<Cid>> {
        if !self.enabled {
            return Err(AnnounceError::Disabled);
        }
        let Some(bitswap_peer) = &self.bitswap_peer else {
            return Ok(None);
        };

        let bitswap_metadata =
            TransportMetadata::new(vec![RetrievalProtocol::BlockExchange]).encode()?;

        let mut builder = AdBuilder::new(&self.host.keypair, self.host.addrs.clone());
        match &self.bitswap_key {
            Some(key) => {
                builder = builder.with_extended_provider(
                    bitswap_peer.clone(),
                    self.bitswap_addrs.clone(),
                    key,
                    bitswap_metadata,
                )?;
            }
            None => {
                builder = builder.with_metadata(bitswap_metadata);
            }
        }

        let last_ad = self.engine.get_latest_adv().await?.map(|(cid, _)| cid);
        let ad = builder.with_last_ad(last_ad).build_and_sign()?;

        let ad_cid = self.engine.publish(ad).await?;
        tracing::info!(ad = %ad_cid, "published extended-providers advertisement");
        Ok(Some(ad_cid))
    }
}
