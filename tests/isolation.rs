//! Row-lock isolation semantics: mutual exclusion, reentrancy, try/timeout.

use rowcache::{CacheBuilder, CacheError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn make_cache() -> rowcache::Cache<&'static str, u64> {
    CacheBuilder::new().build()
}

#[test]
fn isolated_returns_the_closure_result() {
    let cache = make_cache();
    let n = cache.isolated(&"a", None, || 41 + 1).unwrap();
    assert_eq!(n, 42);
}

#[test]
fn nested_isolation_across_distinct_keys() {
    let cache = make_cache();
    let result = cache
        .isolated(&"a", None, || {
            cache.isolated(&"b", None, || cache.isolated(&"c", None, || 1).unwrap())
                .unwrap()
        })
        .unwrap();
    assert_eq!(result, 1);

    // Everything released: the keys are immediately lockable again.
    assert_eq!(cache.isolated(&"a", None, || 2).unwrap(), 2);
}

#[test]
fn reentrant_isolation_on_the_same_key() {
    let cache = make_cache();
    let result = cache
        .isolated(&"k", None, || {
            // Same thread, same key: must not deadlock.
            cache.isolated(&"k", None, || 7).unwrap()
        })
        .unwrap();
    assert_eq!(result, 7);
}

#[test]
fn lock_taking_operations_compose_inside_isolated() {
    let cache = make_cache();
    cache
        .isolated(&"k", None, || {
            cache.put("k", 5).unwrap();
            cache.delete(&"k").unwrap();
            cache.put("k", 6).unwrap();
        })
        .unwrap();
    assert_eq!(cache.get(&"k").as_deref(), Some(&6));
}

#[test]
fn isolated_bodies_on_one_key_never_overlap() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 100;

    let cache = make_cache();
    let in_section = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let c = cache.clone();
            let in_section = Arc::clone(&in_section);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    c.isolated(&"hot", None, || {
                        assert_eq!(in_section.fetch_add(1, Ordering::SeqCst), 0);
                        in_section.fetch_sub(1, Ordering::SeqCst);
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn isolated_blocks_on_distinct_keys_run_concurrently() {
    let cache = make_cache();
    let (inside_a_tx, inside_a_rx) = mpsc::channel();
    let (inside_b_tx, inside_b_rx) = mpsc::channel();

    let holder = {
        let c = cache.clone();
        thread::spawn(move || {
            c.isolated(&"a", None, || {
                inside_a_tx.send(()).unwrap();
                // Only released by the main thread entering isolated("b"):
                // if distinct keys contended, this would time out.
                inside_b_rx
                    .recv_timeout(Duration::from_secs(2))
                    .expect("isolated(b) must proceed while a is held");
            })
            .unwrap();
        })
    };

    inside_a_rx.recv().unwrap();
    cache
        .isolated(&"b", None, || {
            inside_b_tx.send(()).unwrap();
        })
        .unwrap();
    holder.join().unwrap();
}

#[test]
fn try_isolated_reports_contention() {
    let cache = make_cache();
    let (held_tx, held_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();

    let holder = {
        let c = cache.clone();
        thread::spawn(move || {
            c.isolated(&"a", None, || {
                held_tx.send(()).unwrap();
                release_rx.recv_timeout(Duration::from_secs(2)).unwrap();
            })
            .unwrap();
        })
    };

    held_rx.recv().unwrap();
    assert_eq!(
        cache.try_isolated(&"a", || 1),
        Err(CacheError::Locked),
        "held key must report Locked"
    );
    release_tx.send(()).unwrap();
    holder.join().unwrap();

    assert_eq!(cache.try_isolated(&"a", || 1), Ok(1), "released key must be lockable");
}

#[test]
fn isolated_times_out_when_the_key_stays_held() {
    let cache = make_cache();
    let (held_tx, held_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();

    let holder = {
        let c = cache.clone();
        thread::spawn(move || {
            c.isolated(&"a", None, || {
                held_tx.send(()).unwrap();
                release_rx.recv_timeout(Duration::from_secs(2)).unwrap();
            })
            .unwrap();
        })
    };

    held_rx.recv().unwrap();
    let result = cache.isolated(&"a", Some(Duration::from_millis(30)), || 1);
    assert_eq!(result, Err(CacheError::Timeout));

    release_tx.send(()).unwrap();
    holder.join().unwrap();
}

#[test]
fn writes_wait_for_an_isolated_holder() {
    let cache = make_cache();
    let (held_tx, held_rx) = mpsc::channel();

    let holder = {
        let c = cache.clone();
        thread::spawn(move || {
            c.isolated(&"a", None, || {
                c.dirty_put("a", 1);
                held_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
                c.dirty_put("a", 2);
            })
            .unwrap();
        })
    };

    held_rx.recv().unwrap();
    // This put must queue behind the isolated block and observe its final write.
    cache.put("a", 3).unwrap();
    assert_eq!(cache.get(&"a").as_deref(), Some(&3));
    holder.join().unwrap();
}
