//! Embedded ordered key-value backend adapter.
//!
//! Everything the piece directory persists lives in a single ordered
//! keyspace behind the [`KvStore`] trait: typed batched writes, prefix
//! queries with snapshot-consistent iteration, and explicit durability
//! via [`KvStore::sync`].

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::rocks::RocksBackend;
pub use error::{KvError, KvResult};
pub use traits::{KvPair, KvQuery, KvStore, WriteBatch};

use std::path::Path;
use std::sync::Arc;

/// Open the default on-disk backend rooted at the given directory.
pub fn open(path: impl AsRef<Path>) -> KvResult<Arc<dyn KvStore>> {
    let backend = RocksBackend::open(path)?;
    Ok(Arc::new(backend) as Arc<dyn KvStore>)
}
