//! Error taxonomy shared across the gateway.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed operation.
///
/// Every failure that crosses a component boundary is tagged with exactly
/// one kind. The kind decides retry eligibility, the HTTP status surfaced
/// to the client, and which per-provider counter is incremented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Deadline exceeded locally before the upstream replied.
    Timeout,
    /// Transport-layer failure (connect, reset, DNS, TLS).
    Connection,
    /// Upstream rejected the credential (HTTP 401/403).
    Auth,
    /// Upstream rate limit (HTTP 429 or a vendor rate header).
    RateLimit,
    /// Upstream server error (HTTP 5xx, or undocumented 4xx).
    Server,
    /// 2xx reply whose body could not be decoded.
    BadResponse,
    /// The request was abandoned: deadline crossed or client disconnected.
    Cancelled,
    /// Invalid configuration detected at startup.
    Config,
    /// Logic bug; caught and reported, never propagated raw.
    Internal,
}

impl ErrorKind {
    /// Kinds that a retry may recover from.
    ///
    /// `auth` and `bad_response` are persistent: retrying cannot change the
    /// outcome. `cancelled` is always terminal.
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Connection | ErrorKind::Server | ErrorKind::RateLimit
        )
    }

    /// Stable label used in counters and log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection",
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Server => "server",
            ErrorKind::BadResponse => "bad_response",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        }
    }

    /// All kinds, in counter display order.
    pub fn all() -> [ErrorKind; 9] {
        [
            ErrorKind::Timeout,
            ErrorKind::Connection,
            ErrorKind::Auth,
            ErrorKind::RateLimit,
            ErrorKind::Server,
            ErrorKind::BadResponse,
            ErrorKind::Cancelled,
            ErrorKind::Config,
            ErrorKind::Internal,
        ]
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified gateway failure with a short human-readable detail.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {detail}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, detail)
    }

    pub fn connection(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, detail)
    }

    pub fn cancelled(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }
}
