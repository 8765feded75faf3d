//! Property tests for the response cache.
//!
//! Invariants tested:
//! - put-then-get returns the stored response unless evicted (visible in
//!   the stats delta)
//! - an entry past its TTL is never served
//! - entry and byte caps hold under arbitrary insert sequences

use modelmux_cache::ResponseCache;
use modelmux_core::config::CacheConfig;
use modelmux_core::{
    CanonicalResponse, Fingerprint, GenerationParams, Message, TokenUsage,
};
use proptest::prelude::*;
use std::time::Duration;

fn key(text: &str) -> Fingerprint {
    Fingerprint::compute(
        "m",
        &[Message::user(text)],
        None,
        &GenerationParams::default(),
    )
}

fn response(text: &str) -> CanonicalResponse {
    CanonicalResponse::success(
        serde_json::json!({ "text": text }),
        "m",
        "p1",
        1,
        200,
        TokenUsage::new(1, 1),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: put-then-get returns the stored response, or the miss is
    /// explained by an eviction visible in the stats.
    #[test]
    fn put_then_get_or_visible_eviction(texts in prop::collection::vec("[a-z]{1,16}", 1..40)) {
        let cache = ResponseCache::new(&CacheConfig {
            max_entries: 8,
            ..Default::default()
        });

        for text in &texts {
            cache.put(key(text), response(text), None);
            let before = cache.stats();
            match cache.get(&key(text)) {
                Some(got) => prop_assert_eq!(
                    got.content.get("text").and_then(|v| v.as_str()),
                    Some(text.as_str())
                ),
                None => {
                    // Only a preempting eviction may explain the miss.
                    prop_assert!(before.evictions > 0);
                }
            }
        }
    }

    /// Property: the entry cap holds for any insert sequence.
    #[test]
    fn entry_cap_holds(
        cap in 1usize..16,
        texts in prop::collection::vec("[a-z]{1,12}", 0..64),
    ) {
        let cache = ResponseCache::new(&CacheConfig {
            max_entries: cap,
            ..Default::default()
        });
        for text in &texts {
            cache.put(key(text), response(text), None);
            prop_assert!(cache.len() <= cap);
        }
    }

    /// Property: the byte cap holds for any insert sequence.
    #[test]
    fn byte_cap_holds(texts in prop::collection::vec("[a-z]{1,64}", 0..48)) {
        let max_bytes = 2_048usize;
        let cache = ResponseCache::new(&CacheConfig {
            max_entries: 1_000,
            max_bytes,
            ..Default::default()
        });
        for text in &texts {
            cache.put(key(text), response(text), None);
            prop_assert!(cache.stats().bytes <= max_bytes);
        }
    }
}

#[test]
fn expired_entries_are_never_served() {
    let cache = ResponseCache::new(&CacheConfig::default());
    cache.put(key("a"), response("a"), Some(Duration::from_millis(0)));
    std::thread::sleep(Duration::from_millis(2));
    assert!(cache.get(&key("a")).is_none());
    assert_eq!(cache.stats().expirations, 1);
}
