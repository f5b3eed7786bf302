use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::builder::CacheBuilder;
use crate::error::{CacheError, UpdateError};
use crate::expiry::owner::OwnerHandle;
use crate::expiry::steps_for;
use crate::expiry::wheel::TtlAction;
use crate::listener::{CacheListener, Event};
use crate::lock::{LockShards, RowGuard};
use crate::metrics::stats::{Metrics, StatsCounter};
use crate::store::sharded::ShardedStore;

// ---------------------------------------------------------------------------
// TTL specification
// ---------------------------------------------------------------------------

/// How a write affects the entry's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtlSpec {
    /// Apply the cache's configured default TTL.
    Default,
    /// Leave the existing expiry schedule untouched.  An entry first written
    /// with `NoUpdate` never acquires a schedule and lives forever.
    NoUpdate,
    /// Restart the entry's current interval without changing its length.
    /// A no-op when the entry has no schedule (e.g. it already expired).
    Renew,
    /// Expire after `n` sweeper ticks.  `Steps(0)` means "keep forever".
    Steps(u64),
}

/// A value paired with an explicit TTL choice.
///
/// Write operations accept either a bare `V` (which gets [`TtlSpec::Default`])
/// or an `Item` carrying its own [`TtlSpec`].
#[derive(Clone, Copy, Debug)]
pub struct Item<V> {
    pub value: V,
    pub ttl: TtlSpec,
}

impl<V> Item<V> {
    pub fn new(value: V, ttl: TtlSpec) -> Self {
        Item { value, ttl }
    }
}

impl<V> From<V> for Item<V> {
    fn from(value: V) -> Self {
        Item {
            value,
            ttl: TtlSpec::Default,
        }
    }
}

// ---------------------------------------------------------------------------
// Cache interior
// ---------------------------------------------------------------------------

/// Shared interior of a [`Cache`].
pub(crate) struct Inner<K, V> {
    store: ShardedStore<K, V>,
    locks: LockShards<K>,
    /// Optional event listener.  `None` if the user didn't register one.
    listener: Option<Box<dyn CacheListener<K, V>>>,
    metrics: StatsCounter,
    /// Pre-resolved action for [`TtlSpec::Default`] writes; `None` when the
    /// default TTL is zero or the sweeper is disabled.
    default_action: Option<TtlAction>,
    touch_on_read: bool,
    acquire_timeout: Duration,
    owner: OwnerHandle<K>,
}

impl<K, V> Inner<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn lock(&self, key: &K) -> Result<RowGuard<'_, K>, CacheError> {
        self.locks.acquire(key.clone(), Some(self.acquire_timeout))
    }

    fn emit(&self, event: Event<K, V>) {
        if let Some(listener) = &self.listener {
            listener.on_event(event);
        }
    }

    /// Writes `item`, fires the update event, registers its TTL.
    ///
    /// Side effects happen in that order, all on the calling thread, so
    /// holders of the row lock observe them atomically.
    fn store_item(&self, key: K, item: Item<V>) -> Arc<V> {
        let value = Arc::new(item.value);
        self.store.insert(key.clone(), Arc::clone(&value));
        self.emit(Event::Update {
            key: key.clone(),
            value: Arc::clone(&value),
        });
        self.register_ttl(key, item.ttl);
        value
    }

    fn register_ttl(&self, key: K, ttl: TtlSpec) {
        match ttl {
            TtlSpec::Default => {
                if let Some(action) = self.default_action {
                    self.owner.set(key, action);
                }
            }
            TtlSpec::NoUpdate => {}
            TtlSpec::Renew => self.owner.set(key, TtlAction::Renew),
            TtlSpec::Steps(n) => self.owner.set(key, TtlAction::Steps(n)),
        }
    }

    fn insert_new_item(&self, key: K, item: Item<V>) -> Result<(), CacheError> {
        if self.store.contains(&key) {
            return Err(CacheError::AlreadyExists);
        }
        self.store_item(key, item);
        Ok(())
    }

    fn apply_update<I, E, F>(
        &self,
        key: &K,
        f: F,
        require_existing: bool,
    ) -> Result<(), UpdateError<E>>
    where
        I: Into<Item<V>>,
        F: FnOnce(Option<&V>) -> Result<I, E>,
    {
        let current = self.store.get(key);
        if require_existing && current.is_none() {
            return Err(UpdateError::Cache(CacheError::NotExisting));
        }
        let item = f(current.as_deref()).map_err(UpdateError::User)?.into();
        self.store_item(key.clone(), item);
        Ok(())
    }

    /// Fires the delete event, then removes the entry.
    fn delete_entry(&self, key: &K) {
        self.emit(Event::Delete { key: key.clone() });
        self.store.remove(key);
    }

    /// Sweeper-side removal of an expired key, through the row-lock path.
    ///
    /// The infinite wait mirrors user deletes: a long isolated block on the
    /// key delays the sweep rather than aborting it.
    pub(crate) fn expire(&self, key: &K) {
        if let Ok(_guard) = self.locks.acquire(key.clone(), None) {
            self.emit(Event::Delete { key: key.clone() });
            if self.store.remove(key).is_some() {
                self.metrics.record_expiration(1);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Cache handle
// ---------------------------------------------------------------------------

/// A concurrent in-process key/value cache with per-entry TTL expiry and
/// row-level write isolation.
///
/// Writes serialize per key through a sharded lock table; reads are dirty
/// and never block on cache-internal state.  Entry lifetimes are tracked on
/// a discrete-time expiry wheel owned by a background sweeper thread, so a
/// reader racing the sweeper may observe either outcome: eviction is
/// best-effort, not a consistency barrier.
///
/// # Example
/// ```
/// use std::sync::Arc;
///
/// let cache: rowcache::Cache<String, String> = rowcache::CacheBuilder::new().build();
/// cache.put("hello".to_string(), "world".to_string()).unwrap();
/// assert_eq!(
///     cache.get(&"hello".to_string()),
///     Some(Arc::new("world".to_string()))
/// );
/// ```
pub struct Cache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Cache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(builder: CacheBuilder<K, V>) -> Self {
        let (ttl, ttl_check, listener) = (builder.ttl, builder.ttl_check, builder.listener);
        let default_action = match ttl_check {
            Some(tick) if !ttl.is_zero() => Some(TtlAction::Steps(steps_for(ttl, tick))),
            _ => None,
        };
        let max_step = if builder.time_size == 64 {
            u64::MAX
        } else {
            (1u64 << builder.time_size) - 1
        };

        // The owner thread needs a back-reference to the interior it sweeps;
        // it only ever holds it weakly, so teardown is driven by the handles.
        let inner = Arc::new_cyclic(|weak: &Weak<Inner<K, V>>| Inner {
            store: ShardedStore::new(builder.store_shards),
            locks: LockShards::new(builder.lock_shards),
            listener,
            metrics: StatsCounter::new(),
            default_action,
            touch_on_read: builder.touch_on_read,
            acquire_timeout: builder.acquire_lock_timeout,
            owner: match ttl_check {
                Some(tick) => OwnerHandle::spawn(weak.clone(), tick, max_step),
                None => OwnerHandle::disabled(),
            },
        });
        Cache { inner }
    }

    /// Returns a [`CacheBuilder`] for constructing a new cache.
    pub fn builder() -> CacheBuilder<K, V> {
        CacheBuilder::new()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Returns the value for `key` if present.
    ///
    /// This is a dirty read: it takes no row lock and may observe a value
    /// the sweeper is about to delete.  With `touch_on_read` enabled, a hit
    /// renews the entry's expiry schedule.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        match self.inner.store.get(key) {
            Some(value) => {
                self.inner.metrics.record_hit();
                if self.inner.touch_on_read {
                    self.inner.owner.set(key.clone(), TtlAction::Renew);
                }
                Some(value)
            }
            None => {
                self.inner.metrics.record_miss();
                None
            }
        }
    }

    /// Returns `true` if the key is present.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.store.contains(key)
    }

    /// Number of entries currently stored.
    pub fn size(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Restarts the entry's expiry interval without touching its value.
    ///
    /// Lock-free; silently ignored when the entry has no schedule.
    pub fn touch(&self, key: &K) {
        self.inner.owner.set(key.clone(), TtlAction::Renew);
    }

    pub fn stats(&self) -> Metrics {
        self.inner.metrics.snapshot()
    }

    // -----------------------------------------------------------------------
    // Row-locked writes
    // -----------------------------------------------------------------------

    /// Stores a value (or [`Item`]) for `key`, replacing any previous entry.
    pub fn put<I: Into<Item<V>>>(&self, key: K, item: I) -> Result<(), CacheError> {
        let _guard = self.inner.lock(&key)?;
        self.inner.store_item(key, item.into());
        Ok(())
    }

    /// Stores a value for `key` only if the key is absent.
    pub fn insert_new<I: Into<Item<V>>>(&self, key: K, item: I) -> Result<(), CacheError> {
        let _guard = self.inner.lock(&key)?;
        self.inner.insert_new_item(key, item.into())
    }

    /// Atomically read-modify-writes the entry for `key`.
    ///
    /// The updater sees the current value (`None` if absent) and returns
    /// either the replacement (a bare value or an [`Item`]) or an error,
    /// which is passed through untouched as [`UpdateError::User`].
    pub fn update<I, E, F>(&self, key: &K, f: F) -> Result<(), UpdateError<E>>
    where
        I: Into<Item<V>>,
        F: FnOnce(Option<&V>) -> Result<I, E>,
    {
        let _guard = self.inner.lock(key)?;
        self.inner.apply_update(key, f, false)
    }

    /// Like [`update`](Cache::update), but fails with
    /// [`CacheError::NotExisting`] when the key is absent.
    pub fn update_existing<I, E, F>(&self, key: &K, f: F) -> Result<(), UpdateError<E>>
    where
        I: Into<Item<V>>,
        F: FnOnce(Option<&V>) -> Result<I, E>,
    {
        let _guard = self.inner.lock(key)?;
        self.inner.apply_update(key, f, true)
    }

    /// Removes the entry for `key`.  The delete event fires before removal;
    /// deleting an absent key is not an error.
    pub fn delete(&self, key: &K) -> Result<(), CacheError> {
        let _guard = self.inner.lock(key)?;
        self.inner.delete_entry(key);
        Ok(())
    }

    /// Returns the value for `key`, computing and storing it if absent.
    ///
    /// Tries a dirty read first; on a miss it takes the row lock, re-checks,
    /// and only then runs `f`, so concurrent callers compute at most once.
    pub fn get_or_store<I, F>(&self, key: K, f: F) -> Result<Arc<V>, CacheError>
    where
        I: Into<Item<V>>,
        F: FnOnce() -> I,
    {
        if let Some(value) = self.inner.store.get(&key) {
            self.inner.metrics.record_hit();
            return Ok(value);
        }
        let _guard = self.inner.lock(&key)?;
        if let Some(value) = self.inner.store.get(&key) {
            return Ok(value);
        }
        self.inner.metrics.record_miss();
        Ok(self.inner.store_item(key, f().into()))
    }

    // -----------------------------------------------------------------------
    // Isolation
    // -----------------------------------------------------------------------

    /// Runs `f` while holding the row lock for `key`.
    ///
    /// `timeout` of `None` uses the configured `acquire_lock_timeout`.  The
    /// lock is reentrant per thread: `f` may call lock-taking operations on
    /// the same key, including nested `isolated` blocks.
    pub fn isolated<R, F>(
        &self,
        key: &K,
        timeout: Option<Duration>,
        f: F,
    ) -> Result<R, CacheError>
    where
        F: FnOnce() -> R,
    {
        let timeout = timeout.unwrap_or(self.inner.acquire_timeout);
        let _guard = self.inner.locks.acquire(key.clone(), Some(timeout))?;
        Ok(f())
    }

    /// Runs `f` under the row lock for `key` only if it can be taken without
    /// blocking; returns [`CacheError::Locked`] otherwise.
    pub fn try_isolated<R, F>(&self, key: &K, f: F) -> Result<R, CacheError>
    where
        F: FnOnce() -> R,
    {
        let _guard = self.inner.locks.try_acquire(key.clone())?;
        Ok(f())
    }

    // -----------------------------------------------------------------------
    // Dirty writes
    // -----------------------------------------------------------------------
    //
    // Dirty variants skip the row lock entirely; isolation degrades to the
    // store's per-shard locking and correctness becomes the caller's
    // responsibility (typically: the caller already holds an `isolated`
    // block for the key).

    pub fn dirty_put<I: Into<Item<V>>>(&self, key: K, item: I) {
        self.inner.store_item(key, item.into());
    }

    pub fn dirty_insert_new<I: Into<Item<V>>>(&self, key: K, item: I) -> Result<(), CacheError> {
        self.inner.insert_new_item(key, item.into())
    }

    pub fn dirty_update<I, E, F>(&self, key: &K, f: F) -> Result<(), UpdateError<E>>
    where
        I: Into<Item<V>>,
        F: FnOnce(Option<&V>) -> Result<I, E>,
    {
        self.inner.apply_update(key, f, false)
    }

    pub fn dirty_update_existing<I, E, F>(&self, key: &K, f: F) -> Result<(), UpdateError<E>>
    where
        I: Into<Item<V>>,
        F: FnOnce(Option<&V>) -> Result<I, E>,
    {
        self.inner.apply_update(key, f, true)
    }

    pub fn dirty_delete(&self, key: &K) {
        self.inner.delete_entry(key);
    }

    pub fn dirty_get_or_store<I, F>(&self, key: K, f: F) -> Arc<V>
    where
        I: Into<Item<V>>,
        F: FnOnce() -> I,
    {
        match self.inner.store.get(&key) {
            Some(value) => {
                self.inner.metrics.record_hit();
                value
            }
            None => {
                self.inner.metrics.record_miss();
                self.inner.store_item(key, f().into())
            }
        }
    }
}
