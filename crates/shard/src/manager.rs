//! Shard registration and lazy index builds.

use crate::car;
use crate::error::{ShardError, ShardResult};
use cid::Cid;
use cid::multihash::Multihash;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use wharf_core::{Deal, IndexError, Record, SectorAccessor};
use wharf_lid::{LidError, LocalIndexDirectory};

/// Acknowledgement of one shard registration, delivered asynchronously
/// on the caller's result channel.
#[derive(Clone, Debug)]
pub struct ShardRegistration {
    pub piece_cid: Cid,
    /// Why the registration failed, if it did.
    pub error: Option<String>,
}

/// A piece's block index, iterable any number of times.
#[derive(Clone, Debug)]
pub struct IterableIndex {
    records: Vec<Record>,
}

impl IterableIndex {
    fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Iterate the records in key order. Calling again restarts the
    /// iteration.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Iterate just the multihashes, in key order.
    pub fn multihashes(&self) -> impl Iterator<Item = Multihash<64>> + '_ {
        self.records.iter().map(|r| *r.cid.hash())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consume the iterator, yielding the underlying records.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Registers pieces as shards and builds their indexes on demand.
///
/// Cheap to clone; clones share the same throttle and index directory.
#[derive(Clone)]
pub struct ShardManager {
    lid: Arc<LocalIndexDirectory>,
    accessor: Arc<dyn SectorAccessor>,
    /// Bounds the number of concurrent index builds.
    throttle: Arc<Semaphore>,
}

impl ShardManager {
    /// Create a manager that allows at most `add_index_throttle`
    /// concurrent index builds.
    pub fn new(
        lid: Arc<LocalIndexDirectory>,
        accessor: Arc<dyn SectorAccessor>,
        add_index_throttle: usize,
    ) -> Self {
        Self {
            lid,
            accessor,
            throttle: Arc::new(Semaphore::new(add_index_throttle)),
        }
    }

    /// The index directory this manager writes through.
    pub fn lid(&self) -> &Arc<LocalIndexDirectory> {
        &self.lid
    }

    /// Register a deal's piece as a shard.
    ///
    /// Binding the deal is synchronous and idempotent; the rest of the
    /// registration (an index build when `eager`) runs in the
    /// background and acknowledges on `results`.
    pub async fn register_shard(
        &self,
        deal: &Deal,
        eager: bool,
        results: mpsc::Sender<ShardRegistration>,
    ) -> ShardResult<()> {
        match self
            .lid
            .add_deal_for_piece(&deal.piece_cid, deal.deal_info())
            .await
        {
            Ok(()) => {}
            // Re-registering a known deal is a no-op.
            Err(LidError::AlreadyExists(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let manager = self.clone();
        let piece_cid = deal.piece_cid;
        tokio::spawn(async move {
            let error = if eager {
                manager
                    .ensure_index(&piece_cid)
                    .await
                    .err()
                    .map(|e| e.to_string())
            } else {
                None
            };
            let _ = results.send(ShardRegistration { piece_cid, error }).await;
        });
        Ok(())
    }

    /// A restartable iterator over the piece's index, building the
    /// index first if the shard has only been lazily registered.
    pub async fn get_iterable_index_for_piece(
        &self,
        piece_cid: &Cid,
    ) -> ShardResult<IterableIndex> {
        self.ensure_index(piece_cid).await?;
        Ok(IterableIndex::new(self.lid.get_index(piece_cid).await?))
    }

    async fn ensure_index(&self, piece_cid: &Cid) -> ShardResult<()> {
        if self.lid.is_indexed(piece_cid).await? {
            return Ok(());
        }
        self.build_index(piece_cid).await
    }

    /// Build the piece's index from its sector payload.
    ///
    /// Failures are recorded against the piece metadata write-once, so
    /// the first root cause survives later retries.
    pub async fn build_index(&self, piece_cid: &Cid) -> ShardResult<()> {
        let _permit = self
            .throttle
            .acquire()
            .await
            .map_err(|_| ShardError::Cancelled)?;

        // Another build may have won the permit race.
        if self.lid.is_indexed(piece_cid).await? {
            return Ok(());
        }

        match self.scan_piece(piece_cid).await {
            Ok(records) => {
                tracing::info!(piece = %piece_cid, records = records.len(), "built piece index");
                self.lid.add_index(piece_cid, &records, true).await?;
                Ok(())
            }
            Err(e) => {
                let index_error = IndexError {
                    message: e.to_string(),
                    kind: e.kind().to_string(),
                };
                if let Err(mark_err) = self.lid.mark_index_errored(piece_cid, index_error).await {
                    tracing::warn!(piece = %piece_cid, error = %mark_err, "failed to record index error");
                }
                Err(e)
            }
        }
    }

    async fn scan_piece(&self, piece_cid: &Cid) -> ShardResult<Vec<Record>> {
        let metadata = self.lid.get_piece_metadata(piece_cid).await?;
        let deal = metadata
            .deals
            .first()
            .ok_or_else(|| ShardError::NotFound(format!("no deals bound to piece {piece_cid}")))?;

        let reader = self
            .accessor
            .unseal_sector(deal.sector_id, deal.piece_offset, deal.piece_length)
            .await
            .map_err(ShardError::Accessor)?;
        car::scan_car_records(reader).await
    }

    /// Quick health probe: the piece must have readable metadata, no
    /// recorded index error, and a scannable index range.
    pub async fn verify_index(&self, piece_cid: &Cid) -> ShardResult<()> {
        let metadata = self.lid.get_piece_metadata(piece_cid).await?;
        if let Some(error) = &metadata.error {
            return Err(ShardError::CorruptPayload(format!(
                "{} ({})",
                error.message, error.kind
            )));
        }
        if !metadata.is_indexed() {
            // Lazily registered; the index is built on first retrieval.
            return Ok(());
        }
        self.lid
            .count_index_records(metadata.cursor, 1)
            .await
            .map_err(ShardError::Lid)?;
        Ok(())
    }
}
