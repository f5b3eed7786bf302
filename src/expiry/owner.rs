//! Owner loop: the single execution context that mutates the expiry wheel.
//!
//! The wheel's contract is purely sequential, so one dedicated thread owns
//! it outright.  Everything else talks to that thread through a channel:
//! writers enqueue [`TtlAction`]s, a ticker fires every `tick_interval`, and
//! the loop multiplexes both with `select!`.  On each tick the loop advances
//! the wheel and routes every expired key back through the facade's delete
//! path (row lock first, callback, then store removal), so sweeper
//! deletions observe exactly the same ordering guarantees as user deletes.
//!
//! The thread holds only a `Weak` reference to the cache interior.  It exits
//! when the handle shuts it down (or the channel disconnects), never the
//! other way around, and a callback panic is contained to the key that
//! triggered it.

use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};
use tracing::{debug, error};

use crate::cache::Inner;
use crate::expiry::wheel::{ExpiryWheel, TtlAction};

/// Messages accepted by the owner thread.
pub(crate) enum OwnerMsg<K> {
    SetTtl(K, TtlAction),
    Shutdown,
}

/// Handle to the owner thread, owned by the cache interior.
///
/// Dropping the handle shuts the thread down and joins it.  A cache built
/// without a sweeper interval gets a disabled handle: every registration is
/// silently discarded and no thread exists.
pub(crate) struct OwnerHandle<K> {
    tx: Option<Sender<OwnerMsg<K>>>,
    thread: Option<JoinHandle<()>>,
}

impl<K> OwnerHandle<K> {
    /// A handle that drops every registration; used when expiry is disabled.
    pub(crate) fn disabled() -> Self {
        OwnerHandle {
            tx: None,
            thread: None,
        }
    }

    /// Forwards a TTL registration to the owner thread, if one exists.
    pub(crate) fn set(&self, key: K, action: TtlAction) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(OwnerMsg::SetTtl(key, action));
        }
    }
}

impl<K: Hash + Eq + Clone + Send + Sync + 'static> OwnerHandle<K> {
    /// Spawns the owner thread for `cache`, ticking every `tick_interval`.
    pub(crate) fn spawn<V: Send + Sync + 'static>(
        cache: Weak<Inner<K, V>>,
        tick_interval: Duration,
        max_step: u64,
    ) -> Self {
        let (tx, rx) = unbounded();
        let thread = thread::spawn(move || run(cache, rx, tick_interval, max_step));
        OwnerHandle {
            tx: Some(tx),
            thread: Some(thread),
        }
    }
}

impl<K> Drop for OwnerHandle<K> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(OwnerMsg::Shutdown);
        }
        if let Some(thread) = self.thread.take() {
            // The interior can be dropped from the owner thread itself when
            // a sweep callback held the last strong reference.
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

fn run<K, V>(
    cache: Weak<Inner<K, V>>,
    rx: Receiver<OwnerMsg<K>>,
    tick_interval: Duration,
    max_step: u64,
) where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let mut wheel: ExpiryWheel<K> = ExpiryWheel::new(max_step);
    let ticker = tick(tick_interval);
    debug!(tick_ms = tick_interval.as_millis() as u64, "expiry owner started");

    loop {
        select! {
            recv(ticker) -> _ => {
                let expired = wheel.next_step();
                if expired.is_empty() {
                    continue;
                }
                debug!(expired = expired.len(), "expiry sweep");
                let Some(inner) = cache.upgrade() else { continue };
                for key in expired {
                    // A panicking listener must not take the sweeper down;
                    // contain it and move on to the next key.
                    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                        inner.expire(&key);
                    }));
                    if outcome.is_err() {
                        error!("listener panicked during expiry sweep; key skipped");
                    }
                }
            }
            recv(rx) -> msg => match msg {
                Ok(OwnerMsg::SetTtl(key, action)) => wheel.set(key, action),
                Ok(OwnerMsg::Shutdown) | Err(_) => break,
            }
        }
    }
    debug!("expiry owner stopped");
}
