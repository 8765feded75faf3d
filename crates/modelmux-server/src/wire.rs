//! Anthropic-compatible wire codec.
//!
//! Parses the client's messages-API payload into the canonical shape and
//! re-encodes canonical replies (and errors) into the envelopes the
//! client expects.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use modelmux_core::{
    CanonicalRequest, CanonicalResponse, ErrorKind, GenerationParams, Message,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// Advertised wait for rate-limited clients with no better hint.
const RETRY_AFTER_FALLBACK_SECS: u64 = 30;

/// Inbound body of `POST /anthropic/v1/messages`. Unknown fields are
/// preserved and passed through to adapters that understand them.
#[derive(Debug, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl MessagesRequest {
    /// Normalizes into the canonical shape the router dispatches.
    pub fn normalize(self, deadline: Instant) -> CanonicalRequest {
        let params = GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            stop_sequences: self.stop_sequences,
            stream: self.stream,
        };
        let mut request =
            CanonicalRequest::new(self.model, self.messages, self.system, params, deadline);
        request.extra = self.extra;
        request
    }
}

/// Re-encodes a successful canonical response as an Anthropic message.
pub fn encode_message(response: &CanonicalResponse) -> Value {
    let text = response
        .content
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let stop_reason = response
        .content
        .get("stop_reason")
        .and_then(Value::as_str)
        .unwrap_or("end_turn");
    json!({
        "id": format!("msg_{}", uuid::Uuid::new_v4().simple()),
        "type": "message",
        "role": "assistant",
        "content": [{ "type": "text", "text": text }],
        "model": response.model_used,
        "stop_reason": stop_reason,
        "provider_used": response.provider_used,
        "usage": {
            "input_tokens": response.tokens.input,
            "output_tokens": response.tokens.output,
        },
    })
}

/// HTTP status for an error kind; 499 marks client cancellation.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Auth => StatusCode::UNAUTHORIZED,
        ErrorKind::BadResponse | ErrorKind::Server | ErrorKind::Connection => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::Cancelled => {
            StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
        ErrorKind::Config | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_type_for(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Timeout => "timeout_error",
        ErrorKind::RateLimit => "rate_limit_error",
        ErrorKind::Auth => "authentication_error",
        ErrorKind::Cancelled => "request_cancelled",
        _ => "api_error",
    }
}

/// The vendor-shaped error envelope with the status mapping applied.
pub fn error_response(kind: ErrorKind, message: &str) -> Response {
    error_response_with_hint(kind, message, None)
}

/// Same, with an optional known rate-window reset to advertise instead
/// of the fallback wait.
pub fn error_response_with_hint(
    kind: ErrorKind,
    message: &str,
    retry_after: Option<Duration>,
) -> Response {
    let status = status_for(kind);
    let body = json!({
        "type": "error",
        "error": { "type": error_type_for(kind), "message": message },
    });
    let mut response = (status, axum::Json(body)).into_response();
    if kind == ErrorKind::RateLimit {
        let seconds = retry_after
            .map(|wait| wait.as_secs().max(1))
            .unwrap_or(RETRY_AFTER_FALLBACK_SECS);
        if let Ok(value) = seconds.to_string().parse() {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

/// Envelope for malformed client payloads (not an `ErrorKind`; the
/// request never entered the pipeline).
pub fn invalid_request(message: &str) -> Response {
    let body = json!({
        "type": "error",
        "error": { "type": "invalid_request_error", "message": message },
    });
    (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
}

/// Deadline for a freshly admitted request.
pub fn request_deadline(default_timeout: Duration) -> Instant {
    Instant::now() + default_timeout
}
