//! Per-provider mutable state.

use modelmux_breaker::{BreakerState, CircuitBreaker};
use modelmux_core::config::BreakerConfig;
use modelmux_core::ProviderDescriptor;
use modelmux_providers::Adapter;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

/// Latency samples kept per provider for the selection sort.
const LATENCY_WINDOW: usize = 256;

struct MutableState {
    healthy: bool,
    consecutive_failures: u32,
    latencies_ms: VecDeque<u64>,
}

/// One registered provider: its adapter, breaker, and router-owned state.
///
/// The descriptor is immutable after registration; the mutable counters
/// form a single serializable unit guarded by one lock.
pub struct ProviderHandle {
    adapter: Adapter,
    breaker: CircuitBreaker,
    failure_threshold: u32,
    state: Mutex<MutableState>,
}

impl ProviderHandle {
    pub fn new(descriptor: ProviderDescriptor, breaker_config: &BreakerConfig) -> Self {
        let breaker = CircuitBreaker::new(descriptor.name.clone(), breaker_config);
        Self {
            adapter: Adapter::new(descriptor),
            breaker,
            failure_threshold: breaker_config.failure_threshold.max(1),
            state: Mutex::new(MutableState {
                healthy: true,
                consecutive_failures: 0,
                latencies_ms: VecDeque::with_capacity(LATENCY_WINDOW),
            }),
        }
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        self.adapter.descriptor()
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    pub fn healthy(&self) -> bool {
        self.lock().healthy
    }

    /// Set by the periodic probe sweep.
    pub fn set_healthy(&self, healthy: bool) {
        let mut state = self.lock();
        state.healthy = healthy;
        if healthy {
            state.consecutive_failures = 0;
        }
    }

    pub fn record_success(&self, latency_ms: u64) {
        let mut state = self.lock();
        state.healthy = true;
        state.consecutive_failures = 0;
        if state.latencies_ms.len() == LATENCY_WINDOW {
            state.latencies_ms.pop_front();
        }
        state.latencies_ms.push_back(latency_ms);
    }

    /// Records an upstream fault. Rate-limit outcomes are not faults and
    /// never pass through here.
    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures >= self.failure_threshold {
            state.healthy = false;
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn p95_latency_ms(&self) -> u64 {
        let state = self.lock();
        percentile(&state.latencies_ms, 0.95)
    }

    pub fn view(&self) -> ProviderView {
        let descriptor = self.adapter.descriptor();
        let rate = self.adapter.rate_status();
        let state = self.lock();
        ProviderView {
            name: descriptor.name.clone(),
            vendor: descriptor.vendor.as_str(),
            endpoint: descriptor.endpoint.clone(),
            models: descriptor.models.clone(),
            priority: descriptor.priority,
            healthy: state.healthy,
            consecutive_failures: state.consecutive_failures,
            breaker_state: self.breaker.state().as_str(),
            rate_limit_remaining: rate.remaining,
            rate_limit_reset_in_ms: rate.reset_at.map(|at| {
                at.saturating_duration_since(Instant::now()).as_millis() as u64
            }),
            p95_latency_ms: percentile(&state.latencies_ms, 0.95),
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MutableState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// JSON-facing snapshot of one provider, served by the gateway's
/// `/providers` and `/health` endpoints. The credential never appears.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderView {
    pub name: String,
    pub vendor: &'static str,
    pub endpoint: String,
    pub models: Vec<String>,
    pub priority: u32,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub breaker_state: &'static str,
    pub rate_limit_remaining: Option<u64>,
    pub rate_limit_reset_in_ms: Option<u64>,
    pub p95_latency_ms: u64,
}

fn percentile(samples: &VecDeque<u64>, q: f64) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted: Vec<u64> = samples.iter().copied().collect();
    sorted.sort_unstable();
    let rank = ((sorted.len() as f64 - 1.0) * q).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}
