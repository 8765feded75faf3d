//! Deterministic request fingerprinting.
//!
//! The fingerprint is the cache key and the log correlation seed. It covers
//! the model and a canonicalized view of the messages plus the parameters
//! that affect generation semantics. The streaming flag and `top_p` are
//! deliberately excluded: the selection is fixed so that equivalent
//! requests collide regardless of transport details.

use crate::request::{GenerationParams, Message, MessageContent};
use sha2::{Digest, Sha256};

/// SHA-256 digest identifying a cacheable request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Computes the fingerprint over the cache-relevant request fields.
    pub fn compute(
        model: &str,
        messages: &[Message],
        system: Option<&str>,
        params: &GenerationParams,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0x1f]);

        if let Some(system) = system {
            hasher.update(b"system:");
            hasher.update(system.as_bytes());
            hasher.update([0x1f]);
        }

        for message in messages {
            hasher.update(message.role.as_str().as_bytes());
            hasher.update([0x1e]);
            match &message.content {
                MessageContent::Text(text) => hasher.update(text.as_bytes()),
                MessageContent::Blocks(blocks) => {
                    // serde_json renders object keys sorted, so this is a
                    // stable serialization of arbitrary block content.
                    for block in blocks {
                        hasher.update(block.to_string().as_bytes());
                        hasher.update([0x1e]);
                    }
                }
            }
            hasher.update([0x1f]);
        }

        if let Some(max_tokens) = params.max_tokens {
            hasher.update(b"max_tokens:");
            hasher.update(max_tokens.to_le_bytes());
        }
        if let Some(temperature) = params.temperature {
            hasher.update(b"temperature:");
            hasher.update(temperature.to_bits().to_le_bytes());
        }
        for stop in &params.stop_sequences {
            hasher.update(b"stop:");
            hasher.update(stop.as_bytes());
            hasher.update([0x1f]);
        }

        Self(hasher.finalize().into())
    }

    /// Full lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    /// First eight hex characters, used as the log correlation prefix.
    pub fn prefix(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}
