//! Sharded keyed locks for multihash writers.

use std::collections::BTreeSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use tokio::sync::{Mutex, MutexGuard};

const SHARDS: usize = 64;

/// A fixed pool of mutexes indexed by key hash.
///
/// Two concurrent writers touching the same multihash always contend on
/// the same shard, which serializes their read-modify-write cycles.
/// Shards for a call are acquired in ascending index order so that
/// overlapping callers cannot deadlock.
pub struct KeyedLocks {
    shards: Vec<Mutex<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    fn shard_of(key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % SHARDS
    }

    /// Lock every shard covering the given keys.
    ///
    /// The guards serialize this caller against any other caller whose
    /// key set overlaps; they release on drop.
    pub async fn lock_keys<'a, I>(&'a self, keys: I) -> Vec<MutexGuard<'a, ()>>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let shards: BTreeSet<usize> = keys.into_iter().map(|k| Self::shard_of(k)).collect();
        let mut guards = Vec::with_capacity(shards.len());
        for idx in shards {
            guards.push(self.shards[idx].lock().await);
        }
        guards
    }
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new()
    }
}
