//! Property tests for the retry backoff schedule.
//!
//! Invariants tested:
//! - no jittered delay ever exceeds the configured cap
//! - every delay stays within the jitter band of its nominal value

use modelmux_core::config::RetryConfig;
use modelmux_router::BackoffSchedule;
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Property: the cap is absolute, jitter included.
    #[test]
    fn delays_never_exceed_cap(
        base_ms in 1u64..500,
        max_ms in 1u64..2_000,
        jitter in 0.0f64..0.5,
    ) {
        let schedule = BackoffSchedule::new(&RetryConfig {
            base_delay_ms: base_ms,
            max_delay_ms: max_ms,
            jitter_fraction: jitter,
        });
        for delay in schedule.take(12) {
            prop_assert!(delay <= Duration::from_millis(max_ms));
        }
    }

    /// Property: each delay lies within the jitter band around the
    /// doubling series (until the cap truncates the band).
    #[test]
    fn delays_stay_in_the_jitter_band(base_ms in 10u64..200) {
        let jitter = 0.2f64;
        let schedule = BackoffSchedule::new(&RetryConfig {
            base_delay_ms: base_ms,
            max_delay_ms: 1_000_000,
            jitter_fraction: jitter,
        });
        let mut nominal = base_ms as f64;
        for delay in schedule.take(8) {
            let ms = delay.as_secs_f64() * 1_000.0;
            let low = nominal * (1.0 - jitter) - 1.0;
            let high = nominal * (1.0 + jitter) + 1.0;
            prop_assert!(
                ms >= low && ms <= high,
                "delay {}ms outside [{}, {}]", ms, low, high
            );
            nominal *= 2.0;
        }
    }
}
