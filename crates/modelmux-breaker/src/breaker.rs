use crate::events::BreakerEvent;
use modelmux_core::config::BreakerConfig;
use modelmux_core::events::{EventListener, EventListeners};
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Represents the state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BreakerState {
    /// All calls pass.
    Closed = 0,
    /// All calls are rejected until the recovery timeout elapses.
    Open = 1,
    /// Probe calls pass; one failure re-opens.
    HalfOpen = 2,
}

impl BreakerState {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => BreakerState::Open,
            2 => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub time_since_state_change: Duration,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_state_change: Instant,
}

/// Per-upstream failure-state machine.
///
/// `can_execute` is the gate; `record_success` / `record_failure` drive
/// transitions. The open→half-open transition is observed lazily on the
/// next `can_execute` after the recovery timeout.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    success_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
    state_atomic: Arc<AtomicU8>,
    event_listeners: EventListeners<BreakerEvent>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            recovery_timeout: config.recovery_timeout(),
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_state_change: Instant::now(),
            }),
            state_atomic: Arc::new(AtomicU8::new(BreakerState::Closed as u8)),
            event_listeners: EventListeners::new(),
        }
    }

    /// Registers an event listener for transitions and call decisions.
    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: EventListener<BreakerEvent> + 'static,
    {
        self.event_listeners.add(listener);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lock-free state read; may lag one transition behind `can_execute`.
    pub fn state(&self) -> BreakerState {
        BreakerState::from_u8(self.state_atomic.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            time_since_state_change: inner.last_state_change.elapsed(),
        }
    }

    /// Returns whether a call may proceed right now.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        let permitted = match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                if inner.last_state_change.elapsed() >= self.recovery_timeout {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        };

        let event = if permitted {
            BreakerEvent::CallPermitted {
                breaker_name: self.name.clone(),
                timestamp: Instant::now(),
                state: inner.state,
            }
        } else {
            BreakerEvent::CallRejected {
                breaker_name: self.name.clone(),
                timestamp: Instant::now(),
            }
        };
        drop(inner);
        self.event_listeners.emit(&event);
        permitted
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        inner.consecutive_successes = inner.consecutive_successes.saturating_add(1);

        if inner.state == BreakerState::HalfOpen
            && inner.consecutive_successes >= self.success_threshold
        {
            self.transition(&mut inner, BreakerState::Closed);
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_successes = 0;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        match inner.state {
            BreakerState::HalfOpen => {
                // A failed probe re-opens and restarts the recovery timer.
                self.transition(&mut inner, BreakerState::Open);
            }
            BreakerState::Closed => {
                if inner.consecutive_failures >= self.failure_threshold {
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Forces the breaker back to closed, clearing counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, BreakerState::Closed);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, inner: &mut Inner, state: BreakerState) {
        if inner.state == state {
            return;
        }
        let from_state = inner.state;

        self.event_listeners.emit(&BreakerEvent::StateTransition {
            breaker_name: self.name.clone(),
            timestamp: Instant::now(),
            from_state,
            to_state: state,
        });

        tracing::info!(
            breaker = %self.name,
            from = from_state.as_str(),
            to = state.as_str(),
            "breaker state transition"
        );

        #[cfg(feature = "metrics")]
        {
            counter!(
                "breaker_transitions_total",
                "breaker" => self.name.clone(),
                "from" => from_state.as_str(),
                "to" => state.as_str()
            )
            .increment(1);
            gauge!("breaker_state", "breaker" => self.name.clone()).set(state as u8 as f64);
        }

        inner.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        inner.last_state_change = Instant::now();
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
    }
}
