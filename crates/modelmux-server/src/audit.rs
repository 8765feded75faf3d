//! Audit-log subscriber.
//!
//! A second consumer of the outcome records beside the metrics
//! aggregator: one structured log line per attempt and per terminal
//! client request, suitable for shipping to an external audit trail.

use modelmux_core::{AttemptRecord, CacheOutcome, Observer, RequestRecord};

/// Emits an audit line for every attempt and request completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuditObserver;

impl Observer for AuditObserver {
    fn on_attempt(&self, record: &AttemptRecord) {
        match record.outcome {
            Ok(()) => tracing::debug!(
                target: "audit",
                provider = %record.provider,
                model = %record.model,
                latency_ms = record.latency.as_millis() as u64,
                input_tokens = record.tokens.input,
                output_tokens = record.tokens.output,
                "attempt succeeded"
            ),
            Err(kind) => tracing::debug!(
                target: "audit",
                provider = %record.provider,
                model = %record.model,
                latency_ms = record.latency.as_millis() as u64,
                kind = kind.as_str(),
                "attempt failed"
            ),
        }
    }

    fn on_request(&self, record: &RequestRecord) {
        tracing::debug!(
            target: "audit",
            endpoint = record.endpoint,
            status = record.status_code,
            duration_ms = record.duration.as_millis() as u64,
            "request completed"
        );
    }

    fn on_cache(&self, _outcome: CacheOutcome) {}
}
