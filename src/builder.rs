use std::hash::Hash;
use std::time::Duration;

use crate::cache::Cache;
use crate::listener::{CacheListener, Event, FnListener};

/// Builder for configuring and constructing a [`Cache`].
///
/// # Example
/// ```
/// use rowcache::CacheBuilder;
/// use std::time::Duration;
///
/// let cache: rowcache::Cache<String, String> = CacheBuilder::new()
///     .ttl(Duration::from_secs(60))
///     .ttl_check(Duration::from_secs(1))
///     .build();
/// ```
pub struct CacheBuilder<K, V> {
    pub(crate) ttl: Duration,
    pub(crate) ttl_check: Option<Duration>,
    pub(crate) touch_on_read: bool,
    pub(crate) listener: Option<Box<dyn CacheListener<K, V>>>,
    pub(crate) acquire_lock_timeout: Duration,
    pub(crate) time_size: u32,
    pub(crate) lock_shards: usize,
    pub(crate) store_shards: usize,
}

impl<K: 'static, V: 'static> CacheBuilder<K, V> {
    pub fn new() -> Self {
        CacheBuilder {
            ttl: Duration::ZERO,
            ttl_check: None,
            touch_on_read: false,
            listener: None,
            acquire_lock_timeout: Duration::from_secs(5),
            time_size: 64,
            lock_shards: 256,
            store_shards: 64,
        }
    }

    /// Default TTL applied to plain-value writes.  Zero (the default) means
    /// entries never expire unless an [`Item`](crate::Item) says otherwise.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Interval between expiry sweeps.  Leaving this unset disables expiry
    /// entirely: no sweeper thread runs and all TTLs are ignored.
    ///
    /// An entry's effective worst-case lifetime is `ttl + ttl_check`.
    pub fn ttl_check(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "ttl_check must be greater than 0");
        self.ttl_check = Some(interval);
        self
    }

    /// Renew an entry's expiry schedule on every successful read
    /// (default: false).
    pub fn touch_on_read(mut self, touch: bool) -> Self {
        self.touch_on_read = touch;
        self
    }

    /// How long lock-taking operations wait for a contended row lock before
    /// returning [`CacheError::Timeout`](crate::CacheError::Timeout)
    /// (default: 5 s).
    pub fn acquire_lock_timeout(mut self, timeout: Duration) -> Self {
        assert!(!timeout.is_zero(), "acquire_lock_timeout must be greater than 0");
        self.acquire_lock_timeout = timeout;
        self
    }

    /// Bit width of the expiry wheel's tick counter (default: 64).  The
    /// wheel normalizes its tick space when the counter reaches
    /// `2^time_size - 1`; smaller widths exercise normalization sooner.
    pub fn time_size(mut self, bits: u32) -> Self {
        assert!((1..=64).contains(&bits), "time_size must be in 1..=64");
        self.time_size = bits;
        self
    }

    /// Number of row-lock shards (must be a power of two; default: 256).
    pub fn lock_shards(mut self, n: usize) -> Self {
        assert!(n > 0 && n.is_power_of_two(), "lock_shards must be a power of two");
        self.lock_shards = n;
        self
    }

    /// Number of store shards (must be a power of two; default: 64).
    pub fn store_shards(mut self, n: usize) -> Self {
        assert!(n > 0 && n.is_power_of_two(), "store_shards must be a power of two");
        self.store_shards = n;
        self
    }

    /// Register an event listener closure.
    ///
    /// Called synchronously on the writing thread for every update and
    /// delete, including deletes issued by the expiry sweeper.
    ///
    /// # Example
    /// ```
    /// use rowcache::listener::Event;
    /// use rowcache::CacheBuilder;
    ///
    /// let cache: rowcache::Cache<u64, u64> = CacheBuilder::new()
    ///     .listener(|event: Event<u64, u64>| {
    ///         if let Event::Delete { key } = event {
    ///             println!("deleted key={key}");
    ///         }
    ///     })
    ///     .build();
    /// ```
    pub fn listener<F>(mut self, f: F) -> Self
    where
        F: Fn(Event<K, V>) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(FnListener(f)));
        self
    }

    /// Register an event listener via the [`CacheListener`] trait.
    pub fn listener_impl<L: CacheListener<K, V>>(mut self, l: L) -> Self {
        self.listener = Some(Box::new(l));
        self
    }
}

impl<K: 'static, V: 'static> Default for CacheBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn build(self) -> Cache<K, V> {
        Cache::new(self)
    }
}
