//! Response cache for modelmux.
//!
//! A content-addressed store of prior successful upstream responses,
//! shared across requests. Entries are keyed by the request
//! [`Fingerprint`](modelmux_core::Fingerprint), bounded by both an entry
//! cap and a byte cap (LRU eviction), and expire by TTL. Expiry is
//! authoritative: an entry past its TTL is never served even if still in
//! the map.
//!
//! Streaming requests MUST NOT consult or populate the cache; the router
//! enforces that rule.
//!
//! # Example
//!
//! ```
//! use modelmux_cache::ResponseCache;
//! use modelmux_core::config::CacheConfig;
//! use modelmux_core::{
//!     CanonicalResponse, Fingerprint, GenerationParams, Message, TokenUsage,
//! };
//!
//! let cache = ResponseCache::new(&CacheConfig::default());
//! let key = Fingerprint::compute(
//!     "some-model",
//!     &[Message::user("hello")],
//!     None,
//!     &GenerationParams::default(),
//! );
//!
//! let response = CanonicalResponse::success(
//!     serde_json::json!({ "text": "hi" }),
//!     "some-model",
//!     "provider-1",
//!     30,
//!     200,
//!     TokenUsage::new(3, 1),
//! );
//! cache.put(key, response, None);
//!
//! assert!(cache.get(&key).is_some());
//! assert_eq!(cache.stats().hits, 1);
//! ```

mod events;
mod store;

pub use events::CacheEvent;
pub use store::{CacheStats, ResponseCache, ScanReport};
