//! Process-global cache registry.
//!
//! Lets a cache be resolved by name from anywhere in the process instead of
//! threading handles through call chains.  Handles are stored type-erased;
//! [`lookup`] recovers the concrete `Cache<K, V>` by downcast, so a lookup
//! under the wrong type parameters simply returns `None`.
//!
//! # Example
//! ```
//! use rowcache::{registry, CacheBuilder};
//!
//! let cache: rowcache::Cache<String, u64> = CacheBuilder::new().build();
//! registry::register("sessions", &cache);
//!
//! let found: rowcache::Cache<String, u64> =
//!     registry::lookup("sessions").expect("registered above");
//! found.put("user-1".to_string(), 42).unwrap();
//! assert_eq!(cache.get(&"user-1".to_string()).as_deref(), Some(&42));
//!
//! registry::unregister("sessions");
//! assert!(registry::lookup::<String, u64>("sessions").is_none());
//! ```

use std::any::Any;
use std::hash::Hash;
use std::sync::OnceLock;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::cache::Cache;

type Table = RwLock<AHashMap<String, Box<dyn Any + Send + Sync>>>;

static REGISTRY: OnceLock<Table> = OnceLock::new();

fn table() -> &'static Table {
    REGISTRY.get_or_init(|| RwLock::new(AHashMap::new()))
}

/// Registers a handle to `cache` under `name`, replacing any previous
/// registration for that name.
pub fn register<K, V>(name: impl Into<String>, cache: &Cache<K, V>)
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    table().write().insert(name.into(), Box::new(cache.clone()));
}

/// Resolves `name` to a cache handle.
///
/// Returns `None` when the name is unknown or was registered with different
/// key/value types.
pub fn lookup<K, V>(name: &str) -> Option<Cache<K, V>>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    table()
        .read()
        .get(name)
        .and_then(|entry| entry.downcast_ref::<Cache<K, V>>())
        .cloned()
}

/// Removes the registration for `name`.  Returns `true` if one existed.
///
/// The cache itself is unaffected; other handles keep working.
pub fn unregister(name: &str) -> bool {
    table().write().remove(name).is_some()
}
