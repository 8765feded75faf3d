//! Pool behavior tests.
//!
//! Test organization:
//! - checkout.rs: acquire/release ordering and reuse
//! - caps.rs: age, usage, and idle caps
//! - shutdown.rs: drain semantics
