//! Provider adapters for modelmux.
//!
//! An [`Adapter`] translates between the canonical request/response shape
//! and one vendor's native wire format, and tracks the vendor's
//! self-reported rate-limit headroom. The capability set is fixed:
//! encode, decode, probe, rate status, model membership. Adding a
//! provider means adding a [`Vendor`](modelmux_core::Vendor) variant and
//! its codec here; no other component changes.
//!
//! Cerebras, Z.AI, and MiniMax speak OpenAI-style chat-completions
//! dialects with per-vendor paths; the synthetic vendor speaks the
//! Anthropic wire shape unchanged and exists for smoke tooling and tests.

mod adapter;
mod anthropic;
mod openai_compat;
mod rate;

pub use adapter::{Adapter, EncodedRequest};
pub use rate::RateStatus;
