//! One-shot re-registration of pre-existing deals as shards.

use crate::error::{ShardError, ShardResult};
use crate::manager::{ShardManager, ShardRegistration};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, watch};
use wharf_core::DealsDb;

/// Marker filename recording that shard re-registration completed. The
/// path is an on-disk compatibility contract with existing data roots.
const SHARD_REG_MARKER: &str = ".boost-shard-registration-complete";

/// Capacity of the registration acknowledgement channel.
const RESULT_CHANNEL_CAPACITY: usize = 32;

/// Where the registration marker lives under the data root.
pub fn registration_marker_path(root_dir: &Path) -> PathBuf {
    root_dir.join(SHARD_REG_MARKER)
}

/// What a migration pass did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// False when the marker already existed and nothing was done.
    pub migrated: bool,
    /// How many shards were offered for registration.
    pub registered: usize,
}

/// Register every active deal's piece as a lazily-initialized shard,
/// then write the completion marker.
///
/// The migration is a one-shot advisory: individual registration
/// failures are logged and counted but do not abort the pass, and the
/// marker is written regardless so the pass never repeats. Per-piece
/// recovery afterwards comes from the doctor and retrieval-time lazy
/// index builds.
///
/// The marker is only written once every eligible piece was offered
/// for registration in a single pass. A shutdown that cuts off ack
/// consumption after submission finished still writes the marker; a
/// shutdown during submission leaves the marker absent so a later pass
/// can run to completion.
pub async fn reinit_shards(
    root_dir: &Path,
    deals_db: &dyn DealsDb,
    shards: &ShardManager,
    shutdown: watch::Receiver<bool>,
) -> ShardResult<MigrationOutcome> {
    let marker = registration_marker_path(root_dir);
    if tokio::fs::try_exists(&marker).await? {
        tracing::info!("no shard migration necessary; already marked complete");
        return Ok(MigrationOutcome {
            migrated: false,
            registered: 0,
        });
    }

    let deals = deals_db
        .list_active()
        .await
        .map_err(ShardError::Accessor)?;
    tracing::info!(count = deals.len(), "registering shards for active deals");

    let (results_tx, results_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
    let (total_tx, total_rx) = mpsc::channel(1);

    // The consumer starts before registration and learns the total late,
    // once the registrar has finished enumerating.
    let consumer = tokio::spawn(consume_registrations(
        results_rx,
        total_rx,
        shutdown.clone(),
    ));

    let mut registered = 0usize;
    let mut all_submitted = true;
    for deal in &deals {
        if *shutdown.borrow() {
            all_submitted = false;
            break;
        }
        // Deals outside the window either announce later on their own or
        // are no longer being serviced.
        if !deal.checkpoint.is_announceable() {
            continue;
        }

        tracing::info!(
            piece = %deal.piece_cid,
            deal = %deal.deal_uuid,
            "registering shard with lazy init"
        );
        if let Err(e) = shards
            .register_shard(deal, false, results_tx.clone())
            .await
        {
            tracing::warn!(piece = %deal.piece_cid, error = %e, "failed to register shard");
            continue;
        }
        registered += 1;
    }
    drop(results_tx);
    let _ = total_tx.send(registered).await;

    let _ = consumer.await;

    if !all_submitted {
        tracing::warn!(
            registered,
            "shard registration interrupted before every deal was offered; not writing marker"
        );
        return Err(ShardError::Cancelled);
    }
    tracing::info!(total = registered, "finished registering shards");

    if let Err(e) = tokio::fs::File::create(&marker).await {
        tracing::error!(error = %e, "failed to write shard registration marker");
    } else {
        tracing::info!("marked shard registration complete");
    }

    Ok(MigrationOutcome {
        migrated: true,
        registered,
    })
}

async fn consume_registrations(
    mut results: mpsc::Receiver<ShardRegistration>,
    mut total_rx: mpsc::Receiver<usize>,
    mut shutdown: watch::Receiver<bool>,
) {
    // The target starts effectively unbounded and narrows once the
    // registrar reports how many shards it actually submitted.
    let mut total = usize::MAX;
    let mut total_known = false;
    let mut received = 0usize;

    while received < total {
        tokio::select! {
            maybe_total = total_rx.recv(), if !total_known => {
                total_known = true;
                if let Some(t) = maybe_total {
                    total = t;
                }
            }
            result = results.recv() => {
                match result {
                    Some(registration) => {
                        received += 1;
                        match &registration.error {
                            None => tracing::info!(
                                piece = %registration.piece_cid,
                                "shard registration completed"
                            ),
                            Some(error) => tracing::warn!(
                                piece = %registration.piece_cid,
                                error = %error,
                                "shard registration failed"
                            ),
                        }
                    }
                    None => break,
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
