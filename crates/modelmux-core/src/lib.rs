//! Core types for the modelmux gateway.
//!
//! This crate provides the vendor-neutral shapes exchanged between the
//! gateway, router, and provider adapters:
//! - Canonical request/response types
//! - Error kind taxonomy
//! - Request fingerprinting
//! - Provider descriptors and configuration
//! - Event system for observability
//! - The `Observer` capability consumed by the metrics aggregator

pub mod config;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod observer;
pub mod provider;
pub mod request;
pub mod response;

pub use config::GatewayConfig;
pub use error::{ErrorKind, GatewayError};
pub use events::{EventListener, EventListeners, FnListener, GatewayEvent};
pub use fingerprint::Fingerprint;
pub use observer::{
    AttemptRecord, CacheOutcome, FanoutObserver, NoopObserver, Observer, RequestRecord,
};
pub use provider::{ProviderDescriptor, Vendor};
pub use request::{CanonicalRequest, GenerationParams, Message, MessageContent, Role};
pub use response::{CanonicalResponse, ResponseStatus, TokenUsage};
