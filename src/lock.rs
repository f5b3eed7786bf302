//! Row-level locks: per-key mutual exclusion over a sharded record table.
//!
//! A [`LockShards`] instance splits its key space across `N` shards, each an
//! independently-locked map of key → [`LockRecord`].  A record exists only
//! while its key is held or awaited, so memory is bounded by the currently
//! contended working set rather than the total key space.
//!
//! Holder identity is the acquiring thread.  A thread that already owns a
//! key's record re-enters without blocking (`depth` counts the nesting), so
//! lock-taking cache operations may be freely composed inside an isolated
//! block on the same key.
//!
//! Blocked acquirers park on the shard's condvar with a FIFO ticket.  A
//! release wakes the shard; only the waiter whose ticket is at the front of
//! the record's queue may claim ownership, and a fresh acquirer finding an
//! unowned record with a non-empty queue must join the queue behind it.
//! This keeps wakeup order fair without handing the record over directly.

use std::collections::hash_map::Entry;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use ahash::{AHashMap, RandomState};
use parking_lot::{Condvar, Mutex};

use crate::error::CacheError;

/// State of one contended or held key.
struct LockRecord {
    owner: Option<ThreadId>,
    depth: u32,
    /// FIFO tickets of parked acquirers.
    waiters: VecDeque<u64>,
}

impl LockRecord {
    fn held_by(owner: ThreadId) -> Self {
        LockRecord {
            owner: Some(owner),
            depth: 1,
            waiters: VecDeque::new(),
        }
    }
}

/// Cache-line padding to prevent false sharing between shards.
#[repr(align(64))]
struct Shard<K> {
    records: Mutex<AHashMap<K, LockRecord>>,
    /// Signalled whenever a record in this shard becomes claimable.
    unlocked: Condvar,
}

/// A sharded registry of per-key locks.
pub(crate) struct LockShards<K> {
    shards: Box<[Shard<K>]>,
    /// Always `shards.len() - 1`; shards.len() is a power of two.
    shard_mask: usize,
    /// Hasher used only to compute shard indices.
    build_hasher: RandomState,
    next_ticket: AtomicU64,
}

impl<K: Hash + Eq + Clone> LockShards<K> {
    pub(crate) fn new(num_shards: usize) -> Self {
        assert!(num_shards.is_power_of_two());
        let shards = (0..num_shards)
            .map(|_| Shard {
                records: Mutex::new(AHashMap::new()),
                unlocked: Condvar::new(),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        LockShards {
            shards,
            shard_mask: num_shards - 1,
            build_hasher: RandomState::new(),
            next_ticket: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard_for(&self, key: &K) -> &Shard<K> {
        let h = self.build_hasher.hash_one(key);
        &self.shards[((h >> 32) as usize) & self.shard_mask]
    }

    /// Acquires the row lock for `key`, parking until it is free.
    ///
    /// `timeout` of `None` waits indefinitely.  Re-entry by the owning
    /// thread succeeds immediately at any depth.
    pub(crate) fn acquire(
        &self,
        key: K,
        timeout: Option<Duration>,
    ) -> Result<RowGuard<'_, K>, CacheError> {
        let me = thread::current().id();
        let shard = self.shard_for(&key);
        let mut records = shard.records.lock();

        let ticket = match records.entry(key.clone()) {
            Entry::Vacant(e) => {
                e.insert(LockRecord::held_by(me));
                None
            }
            Entry::Occupied(mut e) => {
                let rec = e.get_mut();
                if rec.owner == Some(me) {
                    rec.depth += 1;
                    None
                } else {
                    let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
                    rec.waiters.push_back(ticket);
                    Some(ticket)
                }
            }
        };

        if let Some(ticket) = ticket {
            let deadline = timeout.map(|t| Instant::now() + t);
            loop {
                let timed_out = match deadline {
                    Some(deadline) => shard
                        .unlocked
                        .wait_until(&mut records, deadline)
                        .timed_out(),
                    None => {
                        shard.unlocked.wait(&mut records);
                        false
                    }
                };

                let Some(rec) = records.get_mut(&key) else {
                    // The record vanished while we were parked (all other
                    // waiters timed out after the holder released); the key
                    // is free, so claim it with a fresh record.
                    records.insert(key.clone(), LockRecord::held_by(me));
                    break;
                };

                // Claim before honoring a timeout: a release that raced the
                // deadline must still hand the lock over in queue order.
                if rec.owner.is_none() && rec.waiters.front() == Some(&ticket) {
                    rec.waiters.pop_front();
                    rec.owner = Some(me);
                    rec.depth = 1;
                    break;
                }

                if timed_out {
                    rec.waiters.retain(|&t| t != ticket);
                    if rec.owner.is_none() {
                        if rec.waiters.is_empty() {
                            records.remove(&key);
                        } else {
                            // We may have been at the front; let the next
                            // waiter re-check.
                            shard.unlocked.notify_all();
                        }
                    }
                    return Err(CacheError::Timeout);
                }
            }
        }

        Ok(RowGuard { locks: self, key })
    }

    /// Acquires the row lock for `key` without blocking.
    ///
    /// Returns [`CacheError::Locked`] when any other thread holds the key or
    /// is queued for it.
    pub(crate) fn try_acquire(&self, key: K) -> Result<RowGuard<'_, K>, CacheError> {
        let me = thread::current().id();
        let shard = self.shard_for(&key);
        let mut records = shard.records.lock();

        match records.entry(key.clone()) {
            Entry::Vacant(e) => {
                e.insert(LockRecord::held_by(me));
            }
            Entry::Occupied(mut e) => {
                let rec = e.get_mut();
                if rec.owner != Some(me) {
                    return Err(CacheError::Locked);
                }
                rec.depth += 1;
            }
        }
        Ok(RowGuard { locks: self, key })
    }

    /// Releases one level of ownership for `key`.
    ///
    /// At depth zero the record is either handed to the shard's waiters or
    /// removed entirely, whichever keeps the table minimal.
    fn release(&self, key: &K) {
        let shard = self.shard_for(key);
        let mut records = shard.records.lock();
        if let Some(rec) = records.get_mut(key) {
            rec.depth = rec.depth.saturating_sub(1);
            if rec.depth == 0 {
                rec.owner = None;
                if rec.waiters.is_empty() {
                    records.remove(key);
                } else {
                    shard.unlocked.notify_all();
                }
            }
        }
    }

    /// Number of live records, held or awaited.  Test instrumentation.
    #[cfg(test)]
    fn record_count(&self) -> usize {
        self.shards.iter().map(|s| s.records.lock().len()).sum()
    }
}

/// RAII ownership of a row lock; releases on drop.
pub(crate) struct RowGuard<'a, K: Hash + Eq + Clone> {
    locks: &'a LockShards<K>,
    key: K,
}

impl<K: Hash + Eq + Clone> Drop for RowGuard<'_, K> {
    fn drop(&mut self) {
        self.locks.release(&self.key);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
