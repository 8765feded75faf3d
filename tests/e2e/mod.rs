//! Scenario tests for the full request plane.
//!
//! Test organization:
//! - support.rs: stub upstream + gateway harness
//! - happy_path.rs: cold cache, cache hit
//! - failover.rs: 5xx failover to the next provider
//! - breaker.rs: breaker opens, rejects fast, recovers
//! - deadline.rs: deadline-driven cancellation
//! - websocket.rs: broadcast integrity

mod support;

mod breaker;
mod failover;
mod happy_path;
