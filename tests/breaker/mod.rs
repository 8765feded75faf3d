//! Breaker state-machine tests.
//!
//! Test organization:
//! - thresholds.rs: opening and the consecutive-count rule
//! - half_open.rs: recovery paths through half-open
//! - concurrency.rs: concurrent gate checks and recording

mod concurrency;
