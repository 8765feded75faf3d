//! Property tests for the circuit breaker.
//!
//! Invariants tested:
//! - after `failure_threshold` consecutive failures, `can_execute` is
//!   false until the recovery timeout elapses
//! - interleaved successes prevent opening
//! - recovery requires `success_threshold` consecutive successes

use modelmux_breaker::{BreakerState, CircuitBreaker};
use modelmux_core::config::BreakerConfig;
use proptest::prelude::*;

fn breaker(failures: u32, recovery_ms: u64, successes: u32) -> CircuitBreaker {
    CircuitBreaker::new(
        "test",
        &BreakerConfig {
            failure_threshold: failures,
            recovery_timeout_ms: recovery_ms,
            success_threshold: successes,
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: exactly `threshold` consecutive failures open the
    /// breaker, and it stays open until the timeout elapses.
    #[test]
    fn opens_exactly_at_threshold(threshold in 1u32..12) {
        let breaker = breaker(threshold, 60_000, 1);

        for _ in 0..threshold.saturating_sub(1) {
            breaker.record_failure();
            prop_assert!(breaker.can_execute());
        }
        breaker.record_failure();
        prop_assert_eq!(breaker.state(), BreakerState::Open);
        prop_assert!(!breaker.can_execute());
    }

    /// Property: a success anywhere in the run resets the count, so
    /// fewer than `threshold` consecutive failures never open.
    #[test]
    fn interleaved_successes_keep_it_closed(
        threshold in 2u32..10,
        rounds in 1usize..20,
    ) {
        let breaker = breaker(threshold, 60_000, 1);
        for _ in 0..rounds {
            for _ in 0..threshold - 1 {
                breaker.record_failure();
            }
            breaker.record_success();
        }
        prop_assert_eq!(breaker.state(), BreakerState::Closed);
        prop_assert!(breaker.can_execute());
    }

    /// Property: once half-open, `success_threshold` consecutive
    /// successes close the circuit; one failure re-opens it.
    #[test]
    fn half_open_recovery(successes_needed in 1u32..6) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let breaker = breaker(1, 5, successes_needed);
            breaker.record_failure();
            prop_assert!(!breaker.can_execute());

            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            prop_assert!(breaker.can_execute());
            prop_assert_eq!(breaker.state(), BreakerState::HalfOpen);

            for i in 0..successes_needed {
                prop_assert_ne!(breaker.state(), BreakerState::Closed, "closed after {} successes", i);
                breaker.record_success();
            }
            prop_assert_eq!(breaker.state(), BreakerState::Closed);
            Ok(())
        })?;
    }
}
