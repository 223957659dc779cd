//! Key-value store trait definitions.

use crate::error::KvResult;
use async_trait::async_trait;

/// A prefix query over the ordered keyspace.
#[derive(Clone, Debug, Default)]
pub struct KvQuery {
    /// Only keys starting with this prefix are returned.
    pub prefix: Vec<u8>,
    /// Skip values; [`KvPair::value`] is empty for every result.
    pub keys_only: bool,
    /// Maximum number of pairs to return. `None` means unbounded.
    pub limit: Option<usize>,
    /// Number of matching keys to skip before yielding results.
    pub offset: usize,
}

impl KvQuery {
    /// Query everything under a prefix.
    pub fn prefixed(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Return keys only.
    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    /// Bound the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `offset` matching keys.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// A key/value pair returned by [`KvStore::query`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KvPair {
    pub key: Vec<u8>,
    /// Empty when the query was keys-only.
    pub value: Vec<u8>,
}

/// An ordered set of mutations applied atomically by [`KvStore::write`].
#[derive(Debug, Default)]
pub struct WriteBatch {
    pub(crate) ops: Vec<BatchOp>,
}

#[derive(Debug)]
pub(crate) enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a put.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Stage a delete.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    /// Number of staged operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch has no staged operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Ordered key-value store abstraction.
///
/// Writes are atomic per [`KvStore::write`] batch and durable after a
/// subsequent [`KvStore::sync`]; individual puts are not fsynced.
/// [`KvStore::query`] observes a snapshot taken at call time, so
/// concurrent mutation after the scan begins need not be observed.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Read a single key. Returns `None` when the key is absent.
    async fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// Write a single key.
    async fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()>;

    /// Remove a single key. Removing an absent key is not an error.
    async fn delete(&self, key: &[u8]) -> KvResult<()>;

    /// Apply a batch of mutations atomically.
    async fn write(&self, batch: WriteBatch) -> KvResult<()>;

    /// Scan keys under a prefix, in ascending key order.
    async fn query(&self, query: KvQuery) -> KvResult<Vec<KvPair>>;

    /// Make previously committed writes under the prefix durable.
    async fn sync(&self, prefix: &[u8]) -> KvResult<()>;
}
