//! Error types for cache operations.

use thiserror::Error;

/// Errors surfaced by row-level cache operations.
///
/// These are always returned to the caller; a failed operation never leaves
/// the lock table or the expiry wheel in an inconsistent state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// [`Cache::insert_new`] found the key already present.
    ///
    /// [`Cache::insert_new`]: crate::Cache::insert_new
    #[error("key already exists")]
    AlreadyExists,

    /// [`Cache::update_existing`] found no entry for the key.
    ///
    /// [`Cache::update_existing`]: crate::Cache::update_existing
    #[error("no entry exists for key")]
    NotExisting,

    /// The row lock is currently held by another thread.
    #[error("row lock is held by another thread")]
    Locked,

    /// The row lock could not be acquired before the deadline.
    #[error("timed out waiting for row lock")]
    Timeout,
}

/// Errors surfaced by [`Cache::update`] and [`Cache::update_existing`].
///
/// Wraps either a cache-level failure or the error returned by the
/// user-supplied updater closure, passed through untouched.
///
/// [`Cache::update`]: crate::Cache::update
/// [`Cache::update_existing`]: crate::Cache::update_existing
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UpdateError<E> {
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The updater closure returned `Err`.
    #[error("updater returned an error")]
    User(E),
}
