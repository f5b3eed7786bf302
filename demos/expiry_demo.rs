//! TTL expiry walkthrough: a cache with a fast sweeper, per-item TTL
//! overrides, and an event listener printing every mutation.
//!
//! Run with:
//!     cargo run --example expiry_demo

use rowcache::listener::Event;
use rowcache::{CacheBuilder, Item, TtlSpec};
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let cache: rowcache::Cache<String, String> = CacheBuilder::new()
        .ttl(Duration::from_millis(300))
        .ttl_check(Duration::from_millis(100))
        .listener(|event: Event<String, String>| match event {
            Event::Update { key, value } => println!("  [event] update {key} -> {value}"),
            Event::Delete { key } => println!("  [event] delete {key}"),
        })
        .build();

    println!("writing three entries:");
    // Default TTL (300 ms).
    cache.put("short".to_string(), "expires soon".to_string()).unwrap();
    // Explicit interval: 8 sweeper ticks ≈ 800 ms.
    cache
        .put(
            "longer".to_string(),
            Item::new("expires later".to_string(), TtlSpec::Steps(8)),
        )
        .unwrap();
    // No schedule at all.
    cache
        .put(
            "pinned".to_string(),
            Item::new("never expires".to_string(), TtlSpec::NoUpdate),
        )
        .unwrap();

    for _ in 0..6 {
        std::thread::sleep(Duration::from_millis(250));
        println!(
            "size={} short={} longer={} pinned={}",
            cache.size(),
            cache.contains(&"short".to_string()),
            cache.contains(&"longer".to_string()),
            cache.contains(&"pinned".to_string()),
        );
    }

    let stats = cache.stats();
    println!(
        "done: {} entries left, {} expired by the sweeper",
        cache.size(),
        stats.expirations
    );
}
