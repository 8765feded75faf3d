//! Builders shared by the cache tests.

use modelmux_core::{
    CanonicalResponse, Fingerprint, GenerationParams, Message, TokenUsage,
};

pub fn key(text: &str) -> Fingerprint {
    Fingerprint::compute(
        "m",
        &[Message::user(text)],
        None,
        &GenerationParams::default(),
    )
}

pub fn response(text: &str) -> CanonicalResponse {
    CanonicalResponse::success(
        serde_json::json!({ "text": text, "stop_reason": "end_turn" }),
        "m",
        "p1",
        25,
        200,
        TokenUsage::new(3, 1),
    )
}

/// A response padded to roughly `bytes` of payload.
pub fn sized_response(tag: &str, bytes: usize) -> CanonicalResponse {
    let padding = "x".repeat(bytes);
    CanonicalResponse::success(
        serde_json::json!({ "text": format!("{tag}:{padding}") }),
        "m",
        "p1",
        25,
        200,
        TokenUsage::new(3, 1),
    )
}
