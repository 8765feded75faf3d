use modelmux_core::events::GatewayEvent;
use std::time::Instant;

/// Events emitted by the response cache.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Hit {
        cache_name: String,
        timestamp: Instant,
    },
    Miss {
        cache_name: String,
        timestamp: Instant,
    },
    /// An entry was removed to make room or because it went cold.
    Evicted {
        cache_name: String,
        timestamp: Instant,
        size_bytes: usize,
    },
    /// An entry was removed because its TTL elapsed.
    Expired {
        cache_name: String,
        timestamp: Instant,
    },
}

impl GatewayEvent for CacheEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "hit",
            CacheEvent::Miss { .. } => "miss",
            CacheEvent::Evicted { .. } => "evicted",
            CacheEvent::Expired { .. } => "expired",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CacheEvent::Hit { timestamp, .. }
            | CacheEvent::Miss { timestamp, .. }
            | CacheEvent::Evicted { timestamp, .. }
            | CacheEvent::Expired { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            CacheEvent::Hit { cache_name, .. }
            | CacheEvent::Miss { cache_name, .. }
            | CacheEvent::Evicted { cache_name, .. }
            | CacheEvent::Expired { cache_name, .. } => cache_name,
        }
    }
}
