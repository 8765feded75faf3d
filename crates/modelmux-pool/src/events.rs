use modelmux_core::events::GatewayEvent;
use std::time::Instant;

/// Why an entry left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireReason {
    Failed,
    MaxAge,
    MaxRequests,
    IdleTimeout,
    Shutdown,
}

impl RetireReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RetireReason::Failed => "failed",
            RetireReason::MaxAge => "max_age",
            RetireReason::MaxRequests => "max_requests",
            RetireReason::IdleTimeout => "idle_timeout",
            RetireReason::Shutdown => "shutdown",
        }
    }
}

/// Events emitted by the connection pool.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    EntryCreated {
        pool_name: String,
        timestamp: Instant,
        host: String,
    },
    EntryReused {
        pool_name: String,
        timestamp: Instant,
        host: String,
    },
    EntryRetired {
        pool_name: String,
        timestamp: Instant,
        host: String,
        reason: RetireReason,
    },
    /// A caller had to wait because the pool was at cap.
    Exhausted {
        pool_name: String,
        timestamp: Instant,
        host: String,
    },
}

impl GatewayEvent for PoolEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PoolEvent::EntryCreated { .. } => "entry_created",
            PoolEvent::EntryReused { .. } => "entry_reused",
            PoolEvent::EntryRetired { .. } => "entry_retired",
            PoolEvent::Exhausted { .. } => "exhausted",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            PoolEvent::EntryCreated { timestamp, .. }
            | PoolEvent::EntryReused { timestamp, .. }
            | PoolEvent::EntryRetired { timestamp, .. }
            | PoolEvent::Exhausted { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            PoolEvent::EntryCreated { pool_name, .. }
            | PoolEvent::EntryReused { pool_name, .. }
            | PoolEvent::EntryRetired { pool_name, .. }
            | PoolEvent::Exhausted { pool_name, .. } => pool_name,
        }
    }
}
