//! Failover, retry budgets, rate limiting.

use super::support::{harness, provider, request, Stub};
use modelmux_breaker::BreakerState;
use modelmux_core::ErrorKind;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn failover_walks_down_the_priority_order() {
    let first = Stub::failing(500).await;
    let second = Stub::failing(503).await;
    let third = Stub::ok().await;
    let h = harness(
        vec![
            provider("p1", &first.endpoint(), 1),
            provider("p2", &second.endpoint(), 2),
            provider("p3", &third.endpoint(), 3),
        ],
        |_| {},
    );

    let response = h.router.dispatch(request("hello")).await;
    assert!(response.is_success());
    assert_eq!(response.provider_used, "p3");
    assert_eq!(first.hits(), 1);
    assert_eq!(second.hits(), 1);
    assert_eq!(third.hits(), 1);

    // Two failed attempts plus the success, all recorded.
    assert_eq!(h.observer.failures.load(Ordering::SeqCst), 2);
    assert_eq!(h.observer.successes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_candidates_return_the_last_upstream_failure() {
    let first = Stub::failing(500).await;
    let second = Stub::failing(502).await;
    let h = harness(
        vec![
            provider("p1", &first.endpoint(), 1),
            provider("p2", &second.endpoint(), 2),
        ],
        |_| {},
    );

    let response = h.router.dispatch(request("hello")).await;
    assert!(!response.is_success());
    assert_eq!(response.error_kind, Some(ErrorKind::Server));
    // The failure that surfaces carries upstream evidence, not a local
    // fabrication.
    assert_ne!(response.status_code, 0);
    assert_eq!(first.hits() + second.hits(), 2);
}

#[tokio::test]
async fn auth_failures_surface_without_failover() {
    let rejecting = Stub::failing(403).await;
    let healthy = Stub::ok().await;
    let h = harness(
        vec![
            provider("p1", &rejecting.endpoint(), 1),
            provider("p2", &healthy.endpoint(), 2),
        ],
        |_| {},
    );

    let response = h.router.dispatch(request("hello")).await;
    assert_eq!(response.error_kind, Some(ErrorKind::Auth));
    assert_eq!(healthy.hits(), 0);
}

#[tokio::test]
async fn rate_limited_provider_sits_out_until_reset() {
    let stub = Stub::failing(429).await;
    let h = harness(vec![provider("p1", &stub.endpoint(), 1)], |_| {});

    let first = h.router.dispatch(request("hello")).await;
    assert_eq!(first.error_kind, Some(ErrorKind::RateLimit));
    let upstream_calls = stub.hits();
    assert!(upstream_calls >= 1);

    // The 60s retry-after keeps the provider filtered; no new upstream
    // call happens.
    let second = h.router.dispatch(request("again")).await;
    assert_eq!(second.error_kind, Some(ErrorKind::RateLimit));
    assert_eq!(stub.hits(), upstream_calls);

    // Rate limiting never feeds the breaker.
    let handle = h.router.provider("p1").unwrap();
    assert_eq!(handle.breaker_state(), BreakerState::Closed);
}

#[tokio::test]
async fn attempt_budget_caps_the_retry_walk() {
    let first = Stub::failing(500).await;
    let second = Stub::failing(500).await;
    let third = Stub::failing(500).await;
    let mut p1 = provider("p1", &first.endpoint(), 1);
    let mut p2 = provider("p2", &second.endpoint(), 2);
    let p3 = provider("p3", &third.endpoint(), 3);
    // A budget of 2 attempts stops the walk before the third provider.
    p1.max_retries = 2;
    p2.max_retries = 2;

    let h = harness(vec![p1, p2, p3], |_| {});
    let response = h.router.dispatch(request("hello")).await;
    assert!(!response.is_success());
    assert_eq!(first.hits(), 1);
    assert_eq!(second.hits(), 1);
    assert_eq!(third.hits(), 0);
}

#[tokio::test]
async fn recovered_provider_serves_again_after_breaker_probe() {
    let stub = Stub::failing(500).await;
    let h = harness(vec![provider("p1", &stub.endpoint(), 1)], |config| {
        config.breaker.failure_threshold = 2;
        config.breaker.recovery_timeout_ms = 50;
        config.breaker.success_threshold = 1;
        config.cache.enabled = false;
    });

    for _ in 0..2 {
        let response = h.router.dispatch(request("hello")).await;
        assert!(!response.is_success());
    }
    let handle = h.router.provider("p1").unwrap();
    assert_eq!(handle.breaker_state(), BreakerState::Open);

    tokio::time::sleep(std::time::Duration::from_millis(80)).await;
    stub.set_status(0);

    let response = h.router.dispatch(request("hello")).await;
    assert!(response.is_success());
    assert_eq!(handle.breaker_state(), BreakerState::Closed);
}
