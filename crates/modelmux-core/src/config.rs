//! Gateway configuration.
//!
//! The core receives an already-parsed, already-validated config object;
//! loading, validation, and environment overlay happen outside this
//! workspace. The serde derives exist so tests and embedders can build a
//! config from JSON.

use crate::provider::ProviderDescriptor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub max_concurrent: usize,
    pub default_timeout_ms: u64,
    pub max_body_bytes: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 256,
            default_timeout_ms: 120_000,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl RequestConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the delay randomized in both directions.
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            jitter_fraction: 0.2,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub default_ttl_ms: u64,
    pub max_ttl_ms: u64,
    pub scan_interval_ms: u64,
    /// Minimum hits-per-minute over an entry's lifetime; colder entries
    /// are dropped by the scan worker.
    pub hit_rate_threshold: f64,
    pub adaptive_ttl: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1_000,
            max_bytes: 100 * 1024 * 1024,
            default_ttl_ms: 300_000,
            max_ttl_ms: 3_600_000,
            scan_interval_ms: 60_000,
            hit_rate_threshold: 0.0,
            adaptive_ttl: false,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_millis(self.max_ttl_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub max_age_ms: u64,
    pub idle_timeout_ms: u64,
    pub max_requests_per_entry: u64,
    pub reap_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 64,
            max_age_ms: 600_000,
            idle_timeout_ms: 90_000,
            max_requests_per_entry: 1_000,
            reap_interval_ms: 15_000,
        }
    }
}

impl PoolConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            success_threshold: 2,
        }
    }
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub sample_interval_ms: u64,
    pub broadcast_interval_ms: u64,
    pub history_points: usize,
    pub max_ws_connections: usize,
    /// Sockets that miss a pong for this long are closed on the next sweep.
    pub ws_pong_timeout_ms: u64,
    /// Successes are logged only when they exceed this latency budget.
    pub slow_request_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1_000,
            broadcast_interval_ms: 2_000,
            history_points: 60,
            max_ws_connections: 64,
            ws_pong_timeout_ms: 60_000,
            slow_request_ms: 10_000,
        }
    }
}

impl MetricsConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn ws_pong_timeout(&self) -> Duration {
        Duration::from_millis(self.ws_pong_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When absent, requests are not authenticated.
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// The already-parsed configuration handed to the core at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub providers: Vec<ProviderDescriptor>,
    /// Affinity: among equal-priority candidates this provider wins.
    pub default_provider: Option<String>,
    pub request: RequestConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub pool: PoolConfig,
    pub breaker: BreakerConfig,
    pub metrics: MetricsConfig,
    pub auth: AuthConfig,
    pub listen: ListenConfig,
}
