use crate::breaker::BreakerState;
use modelmux_core::events::GatewayEvent;
use std::time::Instant;

/// Events emitted by a circuit breaker.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    StateTransition {
        breaker_name: String,
        timestamp: Instant,
        from_state: BreakerState,
        to_state: BreakerState,
    },
    CallPermitted {
        breaker_name: String,
        timestamp: Instant,
        state: BreakerState,
    },
    CallRejected {
        breaker_name: String,
        timestamp: Instant,
    },
}

impl GatewayEvent for BreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BreakerEvent::StateTransition { .. } => "state_transition",
            BreakerEvent::CallPermitted { .. } => "call_permitted",
            BreakerEvent::CallRejected { .. } => "call_rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            BreakerEvent::StateTransition { timestamp, .. }
            | BreakerEvent::CallPermitted { timestamp, .. }
            | BreakerEvent::CallRejected { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            BreakerEvent::StateTransition { breaker_name, .. }
            | BreakerEvent::CallPermitted { breaker_name, .. }
            | BreakerEvent::CallRejected { breaker_name, .. } => breaker_name,
        }
    }
}
