//! The `Observer` capability.
//!
//! The router and gateway publish outcome records through this trait; the
//! metrics aggregator implements it. Producers hold only the capability,
//! never the aggregator itself, so no component cycle forms. Additional
//! subscribers (audit log, alerting) can wrap or fan out without touching
//! producers.

use crate::error::ErrorKind;
use crate::response::TokenUsage;
use std::time::Duration;

/// One completed dispatch attempt against a single provider.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub provider: String,
    pub model: String,
    /// `Ok(())` on success, the failure kind otherwise.
    pub outcome: Result<(), ErrorKind>,
    pub latency: Duration,
    pub tokens: TokenUsage,
    /// Estimated USD cost of the attempt; zero for failures.
    pub cost: f64,
    /// Short diagnostic for failures; empty on success.
    pub detail: String,
}

/// One completed client request at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub endpoint: &'static str,
    pub status_code: u16,
    pub duration: Duration,
}

/// Cache consultation result, reported by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

/// Capability held by the router and gateway; implemented by the metrics
/// aggregator. Implementations MUST be non-blocking on the hot path.
pub trait Observer: Send + Sync {
    fn on_attempt(&self, record: &AttemptRecord);

    fn on_request(&self, record: &RequestRecord);

    fn on_cache(&self, outcome: CacheOutcome);
}

/// Observer that discards everything; useful in tests and tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_attempt(&self, _record: &AttemptRecord) {}

    fn on_request(&self, _record: &RequestRecord) {}

    fn on_cache(&self, _outcome: CacheOutcome) {}
}

/// Fans every record out to a set of subscribers. Producers stay unaware
/// of how many consumers exist; adding an audit log or alerting sink is
/// a registration, not a code change.
#[derive(Default)]
pub struct FanoutObserver {
    subscribers: Vec<std::sync::Arc<dyn Observer>>,
}

impl FanoutObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(mut self, observer: std::sync::Arc<dyn Observer>) -> Self {
        self.subscribers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl Observer for FanoutObserver {
    fn on_attempt(&self, record: &AttemptRecord) {
        for subscriber in &self.subscribers {
            subscriber.on_attempt(record);
        }
    }

    fn on_request(&self, record: &RequestRecord) {
        for subscriber in &self.subscribers {
            subscriber.on_request(record);
        }
    }

    fn on_cache(&self, outcome: CacheOutcome) {
        for subscriber in &self.subscribers {
            subscriber.on_cache(outcome);
        }
    }
}
