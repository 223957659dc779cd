//! Periodic piece health checks.

use crate::manager::ShardManager;
use cid::Cid;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use wharf_core::config::DoctorConfig;
use wharf_core::{FlagReason, SectorAccessor};
use wharf_lid::{FlaggedMetadata, LocalIndexDirectory, PieceCheckTracker};

/// Hard deadline for acquiring a probe reader from the sector accessor.
const UNSEAL_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// How much of the piece the probe asks to read.
const UNSEAL_PROBE_BYTES: u64 = 1024;

/// Scans pieces on a slow rolling schedule, flagging those whose index
/// or sector data is unusable and clearing flags once checks pass
/// again.
///
/// The doctor owns its scan state (`tracker`) and runs as a single
/// loop; it is not meant to be driven from more than one task.
pub struct PieceDoctor {
    lid: Arc<LocalIndexDirectory>,
    shards: ShardManager,
    accessor: Arc<dyn SectorAccessor>,
    tracker: PieceCheckTracker,
    sweep_interval: Duration,
}

impl PieceDoctor {
    pub fn new(
        lid: Arc<LocalIndexDirectory>,
        shards: ShardManager,
        accessor: Arc<dyn SectorAccessor>,
        config: &DoctorConfig,
    ) -> Self {
        let period = config.min_piece_check_period();
        Self {
            lid,
            shards,
            accessor,
            tracker: PieceCheckTracker::new(period, config.pieces_to_tracker_batch_size),
            sweep_interval: period,
        }
    }

    /// Run sweeps until the shutdown signal fires.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::debug!("piece doctor stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::warn!(error = %e, "doctor sweep failed");
                    }
                }
            }
        }
    }

    /// Check the next batch of due pieces.
    pub async fn sweep(&mut self) -> crate::ShardResult<usize> {
        let due = self
            .tracker
            .next_pieces_to_check(&self.lid, Instant::now())
            .await?;
        for piece_cid in &due {
            let failure = self.check_piece(piece_cid).await;
            self.apply_flag(piece_cid, failure).await;
        }
        Ok(due.len())
    }

    /// Probe one piece. Returns the reason it should be flagged, or
    /// `None` when the piece is healthy.
    async fn check_piece(&self, piece_cid: &Cid) -> Option<FlagReason> {
        if let Err(e) = self.shards.verify_index(piece_cid).await {
            tracing::debug!(piece = %piece_cid, error = %e, "index check failed");
            return Some(FlagReason::Index);
        }

        let metadata = match self.lid.get_piece_metadata(piece_cid).await {
            Ok(md) => md,
            Err(e) => {
                tracing::debug!(piece = %piece_cid, error = %e, "metadata vanished mid-check");
                return Some(FlagReason::Index);
            }
        };
        // A piece with no bound deal has no sector to probe.
        let deal = metadata.deals.first()?;

        let probe = async {
            let unsealed = self
                .accessor
                .is_unsealed(deal.sector_id, deal.piece_offset, deal.piece_length)
                .await?;
            if !unsealed {
                return Err(wharf_core::Error::External(format!(
                    "no unsealed copy of sector {}",
                    deal.sector_id
                )));
            }
            let _reader = self
                .accessor
                .unseal_sector(
                    deal.sector_id,
                    deal.piece_offset,
                    UNSEAL_PROBE_BYTES.min(deal.piece_length),
                )
                .await?;
            Ok(())
        };
        match tokio::time::timeout(UNSEAL_PROBE_TIMEOUT, probe).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                tracing::debug!(piece = %piece_cid, error = %e, "unseal check failed");
                Some(FlagReason::Unseal)
            }
            Err(_) => {
                tracing::debug!(piece = %piece_cid, "unseal check timed out");
                Some(FlagReason::Unseal)
            }
        }
    }

    async fn apply_flag(&self, piece_cid: &Cid, failure: Option<FlagReason>) {
        let existing = match self.lid.get_piece_cid_to_flagged(piece_cid).await {
            Ok(flag) => flag,
            Err(e) => {
                tracing::warn!(piece = %piece_cid, error = %e, "failed to read flag state");
                return;
            }
        };

        match (failure, existing) {
            (Some(reason), existing) => {
                // Keep the original created_at when only re-confirming.
                if existing.as_ref().is_some_and(|f| f.reason == reason) {
                    return;
                }
                tracing::info!(piece = %piece_cid, reason = %reason, "flagging piece");
                let flag = FlaggedMetadata {
                    created_at: OffsetDateTime::now_utc(),
                    reason,
                };
                if let Err(e) = self.lid.set_piece_cid_to_flagged(piece_cid, flag).await {
                    tracing::warn!(piece = %piece_cid, error = %e, "failed to flag piece");
                }
            }
            (None, Some(_)) => {
                tracing::info!(piece = %piece_cid, "piece recovered; clearing flag");
                if let Err(e) = self.lid.delete_piece_cid_to_flagged(piece_cid).await {
                    tracing::warn!(piece = %piece_cid, error = %e, "failed to clear flag");
                }
            }
            (None, None) => {}
        }
    }
}
