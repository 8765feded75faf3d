//! Per-provider and per-endpoint derivations.

use modelmux_core::config::MetricsConfig;
use modelmux_core::{AttemptRecord, ErrorKind, Observer, RequestRecord, TokenUsage};
use modelmux_metrics::MetricsAggregator;
use std::time::Duration;

fn aggregator() -> MetricsAggregator {
    MetricsAggregator::new(&MetricsConfig::default())
}

fn attempt(provider: &str, outcome: Result<(), ErrorKind>, latency_ms: u64) -> AttemptRecord {
    AttemptRecord {
        provider: provider.to_string(),
        model: "m".to_string(),
        outcome,
        latency: Duration::from_millis(latency_ms),
        tokens: if outcome.is_ok() {
            TokenUsage::new(10, 5)
        } else {
            TokenUsage::default()
        },
        cost: if outcome.is_ok() { 0.002 } else { 0.0 },
        detail: String::new(),
    }
}

#[test]
fn success_rate_reflects_the_mix() {
    let aggregator = aggregator();
    for _ in 0..3 {
        aggregator.on_attempt(&attempt("p1", Ok(()), 20));
    }
    aggregator.on_attempt(&attempt("p1", Err(ErrorKind::Server), 5));

    let view = aggregator.provider_detail("p1").unwrap();
    assert_eq!(view["requests"], 4);
    assert!((view["success_rate"].as_f64().unwrap() - 0.75).abs() < 1e-9);
}

#[test]
fn latency_percentiles_order_correctly() {
    let aggregator = aggregator();
    for latency in [10u64, 20, 30, 40, 400] {
        aggregator.on_attempt(&attempt("p1", Ok(()), latency));
    }

    let view = aggregator.provider_detail("p1").unwrap();
    let p50 = view["p50_latency_ms"].as_u64().unwrap();
    let p95 = view["p95_latency_ms"].as_u64().unwrap();
    let p99 = view["p99_latency_ms"].as_u64().unwrap();
    assert!(p50 <= p95);
    assert!(p95 <= p99);
    assert_eq!(p99, 400);
}

#[test]
fn token_and_cost_totals_accumulate() {
    let aggregator = aggregator();
    for _ in 0..4 {
        aggregator.on_attempt(&attempt("p1", Ok(()), 20));
    }

    let view = aggregator.provider_detail("p1").unwrap();
    assert_eq!(view["tokens"]["input"], 40);
    assert_eq!(view["tokens"]["output"], 20);
    assert_eq!(view["tokens"]["total"], 60);
    assert!((view["cost_per_hour"].as_f64().unwrap() - 0.008).abs() < 1e-9);
}

#[test]
fn error_breakdown_is_per_kind() {
    let aggregator = aggregator();
    aggregator.on_attempt(&attempt("p1", Err(ErrorKind::Timeout), 5));
    aggregator.on_attempt(&attempt("p1", Err(ErrorKind::Timeout), 5));
    aggregator.on_attempt(&attempt("p1", Err(ErrorKind::RateLimit), 5));

    let view = aggregator.provider_detail("p1").unwrap();
    assert_eq!(view["errors"]["timeout"], 2);
    assert_eq!(view["errors"]["rate_limit"], 1);
    assert_eq!(view["failures"], 3);
}

#[test]
fn providers_are_isolated_from_each_other() {
    let aggregator = aggregator();
    aggregator.on_attempt(&attempt("p1", Ok(()), 20));
    aggregator.on_attempt(&attempt("p2", Err(ErrorKind::Server), 5));

    let p1 = aggregator.provider_detail("p1").unwrap();
    let p2 = aggregator.provider_detail("p2").unwrap();
    assert_eq!(p1["failures"], 0);
    assert_eq!(p2["successes"], 0);
    assert!(aggregator.provider_detail("p3").is_none());
}

#[test]
fn registered_providers_appear_before_traffic() {
    let aggregator = aggregator();
    aggregator.register_provider("quiet");

    let view = aggregator.provider_detail("quiet").unwrap();
    assert_eq!(view["requests"], 0);
    assert_eq!(view["success_rate"], 0.0);
}

#[test]
fn performance_view_flags_the_slowest_endpoint() {
    let aggregator = aggregator();
    for _ in 0..3 {
        aggregator.on_request(&RequestRecord {
            endpoint: "/fast",
            status_code: 200,
            duration: Duration::from_millis(5),
        });
    }
    aggregator.on_request(&RequestRecord {
        endpoint: "/slow",
        status_code: 200,
        duration: Duration::from_millis(900),
    });

    let performance = aggregator.performance();
    assert_eq!(performance["total_requests"], 4);
    assert_eq!(performance["slowest_endpoint"]["endpoint"], "/slow");
    assert_eq!(
        performance["slowest_endpoint"]["p99_ms"].as_u64().unwrap(),
        900
    );
}
