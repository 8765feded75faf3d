//! OpenAI-style chat-completions codec.
//!
//! Cerebras, Z.AI, and MiniMax all speak this dialect; only paths and
//! minor usage-reporting details differ.

use crate::adapter::Decoded;
use modelmux_core::{CanonicalRequest, MessageContent, TokenUsage};
use serde_json::{json, Map, Value};

pub(crate) fn encode(request: &CanonicalRequest, model: &str) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for message in &request.messages {
        messages.push(json!({
            "role": message.role.as_str(),
            "content": flatten_content(&message.content),
        }));
    }

    let mut body = Map::new();
    body.insert("model".into(), Value::String(model.to_string()));
    body.insert("messages".into(), Value::Array(messages));
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
        body.insert("stop".into(), json!(request.params.stop_sequences));
    }
    // The streaming flag never goes upstream: the gateway frames
    // client-side streams itself from the buffered reply.
    for (key, value) in &request.extra {
        body.entry(key.clone()).or_insert_with(|| value.clone());
    }

    Value::Object(body)
}

/// This dialect takes string content only; block arrays are flattened to
/// their text parts.
fn flatten_content(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

pub(crate) fn decode(body: &[u8]) -> Result<Decoded, String> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| format!("invalid json: {e}"))?;

    let choice = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| "missing choices".to_string())?;

    let text = choice
        .pointer("/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing message content".to_string())?
        .to_string();

    let stop_reason = match choice.get("finish_reason").and_then(Value::as_str) {
        Some("stop") | None => "end_turn".to_string(),
        Some("length") => "max_tokens".to_string(),
        Some(other) => other.to_string(),
    };

    let usage = value.get("usage");
    let input = usage
        .and_then(|u| u.get("prompt_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    // Some dialects report only a grand total; derive the completion
    // side from it.
    let output = usage
        .and_then(|u| u.get("completion_tokens"))
        .and_then(Value::as_u64)
        .or_else(|| {
            usage
                .and_then(|u| u.get("total_tokens"))
                .and_then(Value::as_u64)
                .map(|total| total.saturating_sub(input))
        })
        .unwrap_or(0);

    Ok(Decoded {
        text,
        stop_reason,
        tokens: TokenUsage::new(input, output),
        model: value
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}
