//! Canonical request shape.
//!
//! The gateway normalizes the client wire protocol into [`CanonicalRequest`]
//! before handing it to the router; adapters translate it into each vendor's
//! native format.

use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Message content: either a plain string or an array of content blocks.
///
/// Block contents are carried opaquely; routing never inspects them beyond
/// the fingerprint hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<serde_json::Value>),
}

impl MessageContent {
    /// Approximate payload size, used for cache byte accounting.
    pub fn size_hint(&self) -> usize {
        match self {
            MessageContent::Text(s) => s.len(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(|b| b.to_string().len())
                .sum(),
        }
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }
}

/// Generation parameters recognized by every adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    #[serde(default)]
    pub stream: bool,
}

/// The vendor-neutral request the router dispatches.
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    /// Logical model identifier as supplied by the client.
    pub model: String,
    /// Ordered conversation turns.
    pub messages: Vec<Message>,
    /// Optional system prompt, kept out of `messages` because vendors
    /// disagree on where it goes.
    pub system: Option<String>,
    pub params: GenerationParams,
    /// Unknown client fields, preserved and passed through to adapters
    /// that understand them.
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Cache key and log correlation seed.
    pub fingerprint: Fingerprint,
    /// Absolute instant after which the request must be abandoned.
    pub deadline: Instant,
    /// Retry counter, starts at 0.
    pub attempt: u32,
    /// Unique id carried through all logs and metric events.
    pub correlation_id: String,
}

impl CanonicalRequest {
    /// Builds a request, computing the fingerprint from the cache-relevant
    /// fields.
    pub fn new(
        model: impl Into<String>,
        messages: Vec<Message>,
        system: Option<String>,
        params: GenerationParams,
        deadline: Instant,
    ) -> Self {
        let model = model.into();
        let fingerprint = Fingerprint::compute(&model, &messages, system.as_deref(), &params);
        Self {
            model,
            messages,
            system,
            params,
            extra: serde_json::Map::new(),
            fingerprint,
            deadline,
            attempt: 0,
            correlation_id: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// Remaining time before the deadline, zero if already crossed.
    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// True once the deadline has been crossed.
    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
