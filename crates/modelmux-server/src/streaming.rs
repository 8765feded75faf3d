//! Server-sent-event framing for `stream: true` requests.
//!
//! The upstream call is buffered by the router (streaming requests bypass
//! the cache in both directions); the gateway frames the reply as the
//! Anthropic event sequence: `message_start`, `ping`,
//! `content_block_delta` chunks, `message_delta`, `message_stop`. A
//! client that disconnects mid-stream drops the response body and the
//! work already done is simply discarded.

use axum::body::Body;
use axum::http::header;
use axum::response::Response;
use futures::stream;
use modelmux_core::CanonicalResponse;
use serde_json::{json, Value};
use std::convert::Infallible;

/// Text chunk size per `content_block_delta` frame.
const DELTA_CHUNK_CHARS: usize = 64;

fn frame(event: &str, data: &Value) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

/// Builds the SSE reply for a completed canonical response.
pub fn sse_response(response: &CanonicalResponse) -> Response {
    let text = response
        .content
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let stop_reason = response
        .content
        .get("stop_reason")
        .and_then(Value::as_str)
        .unwrap_or("end_turn")
        .to_string();
    let message_id = format!("msg_{}", uuid::Uuid::new_v4().simple());

    let mut frames = Vec::new();
    frames.push(frame(
        "message_start",
        &json!({
            "type": "message_start",
            "message": {
                "id": message_id,
                "type": "message",
                "role": "assistant",
                "content": [],
                "model": response.model_used,
                "stop_reason": Value::Null,
                "usage": { "input_tokens": response.tokens.input, "output_tokens": 0 },
            },
        }),
    ));
    frames.push(frame("ping", &json!({ "type": "ping" })));
    frames.push(frame(
        "content_block_start",
        &json!({
            "type": "content_block_start",
            "index": 0,
            "content_block": { "type": "text", "text": "" },
        }),
    ));

    for chunk in chunks(&text, DELTA_CHUNK_CHARS) {
        frames.push(frame(
            "content_block_delta",
            &json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": { "type": "text_delta", "text": chunk },
            }),
        ));
    }

    frames.push(frame(
        "content_block_stop",
        &json!({ "type": "content_block_stop", "index": 0 }),
    ));
    frames.push(frame(
        "message_delta",
        &json!({
            "type": "message_delta",
            "delta": { "stop_reason": stop_reason },
            "usage": { "output_tokens": response.tokens.output },
        }),
    ));
    frames.push(frame("message_stop", &json!({ "type": "message_stop" })));

    let body = Body::from_stream(stream::iter(
        frames.into_iter().map(Ok::<_, Infallible>),
    ));

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|error| {
            tracing::error!(error = %error, "failed to build streaming response");
            Response::new(Body::empty())
        })
}

/// Splits on char boundaries into chunks of at most `size` chars.
fn chunks(text: &str, size: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut current = String::with_capacity(size);
    let mut count = 0;
    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count >= size {
            out.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
