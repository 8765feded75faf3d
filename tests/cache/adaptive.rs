//! Pressure-driven TTL adjustment.

use super::support::{key, response};
use modelmux_cache::ResponseCache;
use modelmux_core::config::CacheConfig;
use std::time::Duration;

fn adaptive_cache() -> ResponseCache {
    ResponseCache::new(&CacheConfig {
        adaptive_ttl: true,
        default_ttl_ms: 1_000,
        max_ttl_ms: 3_000,
        ..Default::default()
    })
}

#[test]
fn multiplier_converges_upward_under_sustained_hits() {
    let cache = adaptive_cache();
    cache.put(key("a"), response("a"), None);
    for _ in 0..100 {
        cache.get(&key("a"));
    }

    let mut last = cache.ttl_multiplier();
    for _ in 0..10 {
        cache.adapt();
        let current = cache.ttl_multiplier();
        assert!(current >= last);
        last = current;
    }
    // Bounded growth.
    assert!(last <= 4.0);
    assert!(last > 1.0);
}

#[test]
fn multiplier_never_leaves_its_band() {
    let cache = adaptive_cache();
    cache.set_ttl_multiplier(1_000.0);
    assert!(cache.ttl_multiplier() <= 4.0);

    cache.set_ttl_multiplier(0.0);
    assert!(cache.ttl_multiplier() >= 0.5);
}

#[test]
fn raised_multiplier_still_honors_the_ttl_cap() {
    let cache = adaptive_cache();
    cache.set_ttl_multiplier(4.0);

    // default 1s x4 would be 4s; cap is 3s. The entry must be gone by
    // the cap, which we approximate by inserting with an explicit tiny
    // TTL and confirming expiry still wins over the multiplier.
    cache.put(key("a"), response("a"), Some(Duration::from_millis(1)));
    std::thread::sleep(Duration::from_millis(10));
    assert!(cache.get(&key("a")).is_none());
}

#[test]
fn too_few_lookups_leave_the_multiplier_alone() {
    let cache = adaptive_cache();
    cache.put(key("a"), response("a"), None);
    for _ in 0..5 {
        cache.get(&key("a"));
    }
    cache.adapt();
    assert_eq!(cache.ttl_multiplier(), 1.0);
}
