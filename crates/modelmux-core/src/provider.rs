//! Provider descriptors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Wire dialect spoken by an upstream provider.
///
/// Adding a vendor means adding a variant here and its codec in the
/// adapters crate; no other component changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Cerebras,
    Zai,
    Minimax,
    /// Anthropic-shaped echo dialect used by smoke tooling and tests.
    Synthetic,
}

impl Vendor {
    pub fn as_str(self) -> &'static str {
        match self {
            Vendor::Cerebras => "cerebras",
            Vendor::Zai => "zai",
            Vendor::Minimax => "minimax",
            Vendor::Synthetic => "synthetic",
        }
    }
}

fn default_priority() -> u32 {
    100
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    3
}

/// Static description of an upstream provider. Immutable after
/// registration; mutable health/rate state lives with the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Unique provider name.
    pub name: String,
    /// Base endpoint, scheme + authority (no trailing slash expected).
    pub endpoint: String,
    /// Plaintext API credential, received at runtime.
    pub credential: String,
    #[serde(default)]
    pub group_id: Option<String>,
    /// Model ids this provider serves.
    pub models: Vec<String>,
    /// Translation from logical model ids to the vendor's native names;
    /// unmapped ids pass through unchanged.
    #[serde(default)]
    pub model_map: HashMap<String, String>,
    /// Lower is preferred.
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Requests per second granted by the vendor; seeds the rate filter
    /// until the first response reports real headroom.
    #[serde(default)]
    pub max_rps: Option<u32>,
    pub vendor: Vendor,
    /// USD per million input tokens, for the cost estimate feed.
    #[serde(default)]
    pub input_cost_per_mtok: f64,
    /// USD per million output tokens.
    #[serde(default)]
    pub output_cost_per_mtok: f64,
}

impl ProviderDescriptor {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Cheap membership test used by the router's candidate filter.
    pub fn supports(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    /// The vendor's name for a logical model id.
    pub fn native_model<'a>(&'a self, model: &'a str) -> &'a str {
        self.model_map
            .get(model)
            .map(String::as_str)
            .unwrap_or(model)
    }

    /// Host portion of the endpoint, the connection-pool key.
    pub fn host(&self) -> &str {
        let rest = self
            .endpoint
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.endpoint);
        rest.split('/').next().unwrap_or(rest)
    }

    /// Estimated cost in USD for a completed call.
    pub fn cost_estimate(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_cost_per_mtok
            + (output_tokens as f64 / 1_000_000.0) * self.output_cost_per_mtok
    }
}
