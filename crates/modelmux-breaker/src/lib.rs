//! Circuit breaker for upstream providers.
//!
//! One breaker guards each upstream. Consecutive failures open the
//! circuit; after a recovery timeout a probe is let through, and enough
//! consecutive successes close it again. Rejections are cheap snapshots,
//! so the router can consult the breaker on every attempt.
//!
//! Calls are counted only when the upstream was actually reached
//! (a response or a transport error); purely local rejections never
//! drive transitions.
//!
//! # Example
//!
//! ```
//! use modelmux_breaker::{BreakerState, CircuitBreaker};
//! use modelmux_core::config::BreakerConfig;
//!
//! let breaker = CircuitBreaker::new(
//!     "upstream",
//!     &BreakerConfig {
//!         failure_threshold: 2,
//!         recovery_timeout_ms: 30_000,
//!         success_threshold: 1,
//!     },
//! );
//!
//! assert!(breaker.can_execute());
//! breaker.record_failure();
//! breaker.record_failure();
//! assert_eq!(breaker.state(), BreakerState::Open);
//! assert!(!breaker.can_execute());
//! ```

mod breaker;
mod events;

pub use breaker::{BreakerSnapshot, BreakerState, CircuitBreaker};
pub use events::BreakerEvent;
