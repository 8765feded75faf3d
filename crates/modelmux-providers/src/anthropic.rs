//! Anthropic-shaped codec used by the synthetic vendor.
//!
//! The canonical shape is already Anthropic-flavored, so encoding is a
//! near passthrough. Decoding accepts both the full messages shape
//! (content as a block array) and the abbreviated stub shape (content as
//! a bare string) that smoke upstreams return.

use crate::adapter::Decoded;
use modelmux_core::{CanonicalRequest, TokenUsage};
use serde_json::{json, Map, Value};

pub(crate) fn encode(request: &CanonicalRequest, model: &str) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|message| {
            json!({
                "role": message.role.as_str(),
                "content": message.content,
            })
        })
        .collect();

    let mut body = Map::new();
    body.insert("model".into(), Value::String(model.to_string()));
    body.insert("messages".into(), Value::Array(messages));
    if let Some(system) = &request.system {
        body.insert("system".into(), Value::String(system.clone()));
    }
    if let Some(max_tokens) = request.params.max_tokens {
        body.insert("max_tokens".into(), json!(max_tokens));
    }
    if let Some(temperature) = request.params.temperature {
        body.insert("temperature".into(), json!(temperature));
    }
    if let Some(top_p) = request.params.top_p {
        body.insert("top_p".into(), json!(top_p));
    }
    if !request.params.stop_sequences.is_empty() {
        body.insert("stop_sequences".into(), json!(request.params.stop_sequences));
    }
    // Streaming is framed client-side by the gateway; the flag is not
    // forwarded.
    for (key, value) in &request.extra {
        body.entry(key.clone()).or_insert_with(|| value.clone());
    }

    Value::Object(body)
}

pub(crate) fn decode(body: &[u8]) -> Result<Decoded, String> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| format!("invalid json: {e}"))?;

    let text = match value.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => return Err("missing content".to_string()),
    };

    let usage = value.get("usage");
    let input = usage
        .and_then(|u| u.get("input_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let output = usage
        .and_then(|u| u.get("output_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    Ok(Decoded {
        text,
        stop_reason: value
            .get("stop_reason")
            .and_then(Value::as_str)
            .unwrap_or("end_turn")
            .to_string(),
        tokens: TokenUsage::new(input, output),
        model: value
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}
