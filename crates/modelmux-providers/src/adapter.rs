//! The adapter capability set.

use crate::anthropic;
use crate::openai_compat;
use crate::rate::RateStatus;
use modelmux_core::{CanonicalRequest, CanonicalResponse, ErrorKind, ProviderDescriptor, TokenUsage, Vendor};
use reqwest::header::HeaderMap;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Fallback cooldown applied on a 429 without a retry-after hint.
const RATE_LIMIT_FALLBACK: Duration = Duration::from_secs(30);

/// How much upstream error body to keep as diagnostic detail.
const ERROR_DETAIL_LIMIT: usize = 200;

/// A vendor-shaped request ready to send: path relative to the provider
/// endpoint, auth headers, JSON body.
#[derive(Debug, Clone)]
pub struct EncodedRequest {
    pub path: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

/// Vendor-neutral fields extracted from a successful reply.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Decoded {
    pub text: String,
    pub stop_reason: String,
    pub tokens: TokenUsage,
    pub model: String,
}

/// Translator between the canonical shape and one vendor's wire format,
/// plus that vendor's rate-limit accounting.
pub struct Adapter {
    descriptor: ProviderDescriptor,
    rate: Mutex<RateStatus>,
}

impl Adapter {
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        let mut rate = RateStatus::default();
        // Seed headroom from the configured budget until real headers
        // arrive.
        if let Some(max_rps) = descriptor.max_rps {
            rate.remaining = Some(u64::from(max_rps));
        }
        Self {
            descriptor,
            rate: Mutex::new(rate),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    /// Cheap membership test used by the router's candidate filter.
    pub fn supports(&self, model: &str) -> bool {
        self.descriptor.supports(model)
    }

    /// Shapes the vendor payload and attaches auth headers. The logical
    /// model id is translated through the descriptor's model map.
    pub fn encode(&self, request: &CanonicalRequest) -> EncodedRequest {
        let model = self.descriptor.native_model(&request.model);
        let (path, body) = match self.descriptor.vendor {
            Vendor::Cerebras | Vendor::Zai => {
                ("/chat/completions", openai_compat::encode(request, model))
            }
            Vendor::Minimax => (
                "/text/chatcompletion_v2",
                openai_compat::encode(request, model),
            ),
            Vendor::Synthetic => ("/v1/messages", anthropic::encode(request, model)),
        };
        EncodedRequest {
            path,
            headers: self.auth_headers(),
            body,
        }
    }

    /// Lightweight GET suitable for periodic health scheduling.
    pub fn probe_request(&self) -> EncodedRequest {
        let path = match self.descriptor.vendor {
            Vendor::Cerebras | Vendor::Zai | Vendor::Minimax => "/models",
            Vendor::Synthetic => "/v1/models",
        };
        EncodedRequest {
            path,
            headers: self.auth_headers(),
            body: Value::Null,
        }
    }

    /// Full URL for an encoded path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.descriptor.endpoint.trim_end_matches('/'), path)
    }

    /// Extracts content, token counts, and error kind from an upstream
    /// reply, folding any rate-limit headers into `rate_status`.
    pub fn decode(
        &self,
        status_code: u16,
        headers: &HeaderMap,
        body: &[u8],
        latency_ms: u64,
    ) -> CanonicalResponse {
        let now = Instant::now();
        {
            let mut rate = self.lock_rate();
            rate.observe(headers, now);
        }

        match status_code {
            200..=299 => {
                // MiniMax reports some failures inside a 2xx envelope.
                if self.descriptor.vendor == Vendor::Minimax {
                    if let Some(error) = self.minimax_soft_error(body, latency_ms, status_code, now)
                    {
                        return error;
                    }
                }
                let decoded = match self.descriptor.vendor {
                    Vendor::Cerebras | Vendor::Zai | Vendor::Minimax => {
                        openai_compat::decode(body)
                    }
                    Vendor::Synthetic => anthropic::decode(body),
                };
                match decoded {
                    Ok(decoded) => CanonicalResponse::success(
                        json!({ "text": decoded.text, "stop_reason": decoded.stop_reason }),
                        decoded.model,
                        self.descriptor.name.clone(),
                        latency_ms,
                        status_code,
                        decoded.tokens,
                    ),
                    Err(detail) => self.error(ErrorKind::BadResponse, detail, latency_ms, status_code),
                }
            }
            401 | 403 => self.error(
                ErrorKind::Auth,
                body_detail(body, "credential rejected"),
                latency_ms,
                status_code,
            ),
            429 => {
                {
                    let mut rate = self.lock_rate();
                    if rate.reset_at.map_or(true, |at| at <= now) {
                        rate.exhausted_for(RATE_LIMIT_FALLBACK, now);
                    } else {
                        rate.remaining = Some(0);
                    }
                }
                self.error(
                    ErrorKind::RateLimit,
                    body_detail(body, "rate limited"),
                    latency_ms,
                    status_code,
                )
            }
            500..=599 => self.error(
                ErrorKind::Server,
                body_detail(body, "upstream server error"),
                latency_ms,
                status_code,
            ),
            _ => self.error(
                ErrorKind::Server,
                body_detail(body, "unexpected upstream status"),
                latency_ms,
                status_code,
            ),
        }
    }

    /// Maps a transport-layer failure to an error kind.
    pub fn classify_transport(&self, error: &reqwest::Error) -> ErrorKind {
        if error.is_timeout() {
            ErrorKind::Timeout
        } else {
            ErrorKind::Connection
        }
    }

    /// Whether a probe reply means healthy.
    pub fn probe_ok(&self, status_code: u16) -> bool {
        (200..=299).contains(&status_code)
    }

    /// Last observed rate-limit headroom.
    pub fn rate_status(&self) -> RateStatus {
        *self.lock_rate()
    }

    /// Whether the rate filter should admit a request right now.
    pub fn has_rate_headroom(&self) -> bool {
        self.lock_rate().has_headroom(Instant::now())
    }

    /// MiniMax wraps its status in `base_resp`; a non-zero code inside a
    /// 2xx reply is still a failure. 1002 is their rate-limit code.
    fn minimax_soft_error(
        &self,
        body: &[u8],
        latency_ms: u64,
        status_code: u16,
        now: Instant,
    ) -> Option<CanonicalResponse> {
        let value: Value = serde_json::from_slice(body).ok()?;
        let base = value.get("base_resp")?;
        let code = base.get("status_code").and_then(Value::as_i64).unwrap_or(0);
        if code == 0 {
            return None;
        }
        let message = base
            .get("status_msg")
            .and_then(Value::as_str)
            .unwrap_or("upstream error");

        let kind = if code == 1002 {
            let mut rate = self.lock_rate();
            if rate.reset_at.map_or(true, |at| at <= now) {
                rate.exhausted_for(RATE_LIMIT_FALLBACK, now);
            } else {
                rate.remaining = Some(0);
            }
            ErrorKind::RateLimit
        } else {
            ErrorKind::Server
        };

        Some(self.error(
            kind,
            format!("base_resp {code}: {message}"),
            latency_ms,
            status_code,
        ))
    }

    fn auth_headers(&self) -> Vec<(&'static str, String)> {
        match self.descriptor.vendor {
            Vendor::Cerebras | Vendor::Zai | Vendor::Minimax => vec![(
                "authorization",
                format!("Bearer {}", self.descriptor.credential),
            )],
            Vendor::Synthetic => vec![
                ("x-api-key", self.descriptor.credential.clone()),
                ("anthropic-version", "2023-06-01".to_string()),
            ],
        }
    }

    fn error(
        &self,
        kind: ErrorKind,
        detail: String,
        latency_ms: u64,
        status_code: u16,
    ) -> CanonicalResponse {
        CanonicalResponse::upstream_error(
            kind,
            detail,
            self.descriptor.name.clone(),
            latency_ms,
            status_code,
        )
    }

    fn lock_rate(&self) -> std::sync::MutexGuard<'_, RateStatus> {
        self.rate.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn body_detail(body: &[u8], fallback: &str) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    trimmed.chars().take(ERROR_DETAIL_LIMIT).collect()
}
