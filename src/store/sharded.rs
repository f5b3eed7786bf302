use std::hash::Hash;
use std::sync::Arc;

use ahash::{AHashMap, RandomState};
use parking_lot::RwLock;

// ---------------------------------------------------------------------------
// Shard
// ---------------------------------------------------------------------------

/// Cache-line padding to prevent false sharing between shards.
#[repr(align(64))]
struct Shard<K, V> {
    map: RwLock<AHashMap<K, Arc<V>>>,
}

// ---------------------------------------------------------------------------
// ShardedStore
// ---------------------------------------------------------------------------

/// A thread-safe key-value store backed by `N` independently-locked shards.
///
/// Reads use a shared lock, writes use an exclusive lock, both per-shard.
/// The store holds no lifetime metadata: entry expiry is owned entirely by
/// the expiry wheel, and removal arrives here as an ordinary `remove`.
pub(crate) struct ShardedStore<K, V> {
    shards: Box<[Shard<K, V>]>,
    /// Always `shards.len() - 1`; shards.len() is a power of two.
    shard_mask: usize,
    /// Hasher used only to compute shard indices.
    build_hasher: RandomState,
}

impl<K: Hash + Eq + Clone, V> ShardedStore<K, V> {
    pub(crate) fn new(num_shards: usize) -> Self {
        assert!(num_shards.is_power_of_two());
        let shards = (0..num_shards)
            .map(|_| Shard {
                map: RwLock::new(AHashMap::new()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        ShardedStore {
            shards,
            shard_mask: num_shards - 1,
            build_hasher: RandomState::new(),
        }
    }

    #[inline]
    fn shard_index(&self, key: &K) -> usize {
        let h = self.build_hasher.hash_one(key);
        // Use the high bits (better avalanche from ahash).
        ((h >> 32) as usize) & self.shard_mask
    }

    /// Returns the value for `key`, or `None` if absent.
    pub(crate) fn get(&self, key: &K) -> Option<Arc<V>> {
        let idx = self.shard_index(key);
        self.shards[idx].map.read().get(key).map(Arc::clone)
    }

    /// Inserts `value` for `key`.  Returns the previous value, if any.
    pub(crate) fn insert(&self, key: K, value: Arc<V>) -> Option<Arc<V>> {
        let idx = self.shard_index(&key);
        self.shards[idx].map.write().insert(key, value)
    }

    /// Removes the entry for `key`.  Returns the removed value, if any.
    pub(crate) fn remove(&self, key: &K) -> Option<Arc<V>> {
        let idx = self.shard_index(key);
        self.shards[idx].map.write().remove(key)
    }

    /// Returns `true` if the key is present.
    pub(crate) fn contains(&self, key: &K) -> bool {
        let idx = self.shard_index(key);
        self.shards[idx].map.read().contains_key(key)
    }

    /// Returns the total number of entries across all shards.
    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|s| s.map.read().len()).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.map.read().is_empty())
    }
}
