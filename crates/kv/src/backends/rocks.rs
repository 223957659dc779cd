//! RocksDB-backed key-value store.

use crate::error::KvResult;
use crate::traits::{BatchOp, KvPair, KvQuery, KvStore, WriteBatch};
use async_trait::async_trait;
use rocksdb::{DBCompressionType, Direction, IteratorMode, Options, DB};
use std::path::Path;

/// Embedded ordered store on RocksDB.
///
/// Single keyspace, no column families: logical tables are carved out of
/// the key ordering by prefix, which keeps the on-disk key layout a
/// stable contract. Per-write fsync is disabled; durability comes from
/// the explicit [`KvStore::sync`] WAL flush at checkpoints.
pub struct RocksBackend {
    db: DB,
}

impl RocksBackend {
    /// Open (or create) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> KvResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_use_fsync(false);

        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }
}

#[async_trait]
impl KvStore for RocksBackend {
    async fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
        Ok(self.db.put(key, value)?)
    }

    async fn delete(&self, key: &[u8]) -> KvResult<()> {
        Ok(self.db.delete(key)?)
    }

    async fn write(&self, batch: WriteBatch) -> KvResult<()> {
        let mut inner = rocksdb::WriteBatch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put { key, value } => inner.put(key, value),
                BatchOp::Delete { key } => inner.delete(key),
            }
        }
        Ok(self.db.write(inner)?)
    }

    async fn query(&self, query: KvQuery) -> KvResult<Vec<KvPair>> {
        // The snapshot pins the state observed by this scan; mutations
        // committed after this point are not visible to it.
        let snapshot = self.db.snapshot();
        let mode = IteratorMode::From(&query.prefix, Direction::Forward);

        let mut pairs = Vec::new();
        let mut skipped = 0usize;
        for item in snapshot.iterator(mode) {
            let (key, value) = item?;
            if !key.starts_with(&query.prefix) {
                break;
            }
            if skipped < query.offset {
                skipped += 1;
                continue;
            }
            pairs.push(KvPair {
                key: key.to_vec(),
                value: if query.keys_only {
                    Vec::new()
                } else {
                    value.to_vec()
                },
            });
            if let Some(limit) = query.limit {
                if pairs.len() >= limit {
                    break;
                }
            }
        }
        Ok(pairs)
    }

    async fn sync(&self, prefix: &[u8]) -> KvResult<()> {
        // RocksDB durability is WAL-wide; the prefix identifies the
        // logical table being checkpointed for tracing purposes.
        tracing::trace!(prefix_len = prefix.len(), "flushing wal");
        Ok(self.db.flush_wal(true)?)
    }
}
