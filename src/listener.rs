//! Cache event listener: a callback invoked on every write-side mutation.
//!
//! # Example
//! ```
//! use rowcache::listener::Event;
//! use rowcache::CacheBuilder;
//! use std::sync::{Arc, Mutex};
//!
//! let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
//! let log2 = Arc::clone(&log);
//!
//! let cache: rowcache::Cache<u64, u64> = CacheBuilder::new()
//!     .listener(move |event: Event<u64, u64>| {
//!         let line = match event {
//!             Event::Update { key, value } => format!("update {key} -> {value}"),
//!             Event::Delete { key } => format!("delete {key}"),
//!         };
//!         log2.lock().unwrap().push(line);
//!     })
//!     .build();
//!
//! cache.put(1, 10).unwrap();
//! cache.delete(&1).unwrap();
//! assert_eq!(log.lock().unwrap().len(), 2);
//! ```

use std::sync::Arc;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A write-side mutation observed by the cache.
#[derive(Clone, Debug)]
pub enum Event<K, V> {
    /// A value was stored (by `put`, `insert_new`, `update*`, or a
    /// `get_or_store` that computed the value).  Emitted after the store
    /// mutation succeeds.
    Update { key: K, value: Arc<V> },
    /// The entry for `key` is being removed, by an explicit delete or by the
    /// expiry sweeper.  Emitted before the store mutation.
    Delete { key: K },
}

// ---------------------------------------------------------------------------
// CacheListener trait
// ---------------------------------------------------------------------------

/// A callback receiving every [`Event`] a cache emits.
///
/// Events are delivered synchronously on the thread performing the write
/// (client threads for user operations, the owner thread for expiry sweeps)
/// while the row lock for the key is held.  For a given key, events arrive
/// in the same total order as the operations that produced them.
///
/// Keep listeners short: a slow listener extends the time the row lock is
/// held.  Calling lock-taking cache methods on the *same* key from inside
/// the listener is safe (the row lock is reentrant per thread), but locking
/// other keys risks the usual lock-ordering deadlocks.
pub trait CacheListener<K, V>: Send + Sync + 'static {
    fn on_event(&self, event: Event<K, V>);
}

/// A [`CacheListener`] backed by a closure.
///
/// Created via [`CacheBuilder::listener`](crate::CacheBuilder::listener).
pub struct FnListener<F>(pub F);

impl<K, V, F> CacheListener<K, V> for FnListener<F>
where
    F: Fn(Event<K, V>) + Send + Sync + 'static,
{
    fn on_event(&self, event: Event<K, V>) {
        (self.0)(event)
    }
}
