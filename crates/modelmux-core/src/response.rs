//! Canonical response shape.

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// Final disposition of a dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    UpstreamError,
    LocalError,
}

/// Token accounting as reported by the upstream; zeros when unreported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

/// The vendor-neutral reply the router hands back to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalResponse {
    pub status: ResponseStatus,
    /// Opaque payload to be re-encoded for the client.
    pub content: serde_json::Value,
    pub model_used: String,
    pub provider_used: String,
    pub latency_ms: u64,
    pub status_code: u16,
    pub tokens: TokenUsage,
    /// Populated only when `status != Success`.
    pub error_kind: Option<ErrorKind>,
    /// Short diagnostic string; never a stack trace.
    #[serde(default)]
    pub detail: String,
}

impl CanonicalResponse {
    pub fn success(
        content: serde_json::Value,
        model_used: impl Into<String>,
        provider_used: impl Into<String>,
        latency_ms: u64,
        status_code: u16,
        tokens: TokenUsage,
    ) -> Self {
        Self {
            status: ResponseStatus::Success,
            content,
            model_used: model_used.into(),
            provider_used: provider_used.into(),
            latency_ms,
            status_code,
            tokens,
            error_kind: None,
            detail: String::new(),
        }
    }

    /// A failure observed from the upstream (a response or transport error
    /// after the call was actually issued).
    pub fn upstream_error(
        kind: ErrorKind,
        detail: impl Into<String>,
        provider_used: impl Into<String>,
        latency_ms: u64,
        status_code: u16,
    ) -> Self {
        Self {
            status: ResponseStatus::UpstreamError,
            content: serde_json::Value::Null,
            model_used: String::new(),
            provider_used: provider_used.into(),
            latency_ms,
            status_code,
            tokens: TokenUsage::default(),
            error_kind: Some(kind),
            detail: detail.into(),
        }
    }

    /// A failure produced without reaching any upstream (no candidates,
    /// breaker rejection, deadline crossed locally).
    pub fn local_error(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::LocalError,
            content: serde_json::Value::Null,
            model_used: String::new(),
            provider_used: String::new(),
            latency_ms: 0,
            status_code: 0,
            tokens: TokenUsage::default(),
            error_kind: Some(kind),
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Approximate in-memory size, used for cache byte accounting.
    pub fn size_bytes(&self) -> usize {
        self.content.to_string().len() + self.model_used.len() + self.provider_used.len() + 96
    }
}
