//! Property tests.
//!
//! Test organization:
//! - cache.rs: round trip, expiry, cap invariants
//! - breaker.rs: threshold and recovery invariants
//! - pool.rs: in-flight checkout bound
//! - backoff.rs: delay cap and jitter band

mod backoff;
mod breaker;
mod cache;
mod pool;
