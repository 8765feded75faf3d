//! Event system shared by the gateway components.
//!
//! Components publish typed events (breaker transitions, pool retirements,
//! cache evictions) to registered listeners. Listeners are fire-and-forget
//! observers; a panicking listener is isolated so the remaining listeners
//! still run.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait for events emitted by gateway components.
pub trait GatewayEvent: Send + Sync + fmt::Debug {
    /// Returns the type of event (e.g. "state_transition", "entry_retired").
    fn event_type(&self) -> &'static str;

    /// Returns when this event occurred.
    fn timestamp(&self) -> Instant;

    /// Returns the name of the component instance that emitted this event.
    fn source(&self) -> &str;
}

/// Trait for listening to gateway events.
pub trait EventListener<E: GatewayEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// Type alias for boxed event listeners.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// A collection of event listeners.
#[derive(Clone)]
pub struct EventListeners<E: GatewayEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: GatewayEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to all registered listeners.
    ///
    /// A panicking listener is caught and logged; the remaining listeners
    /// are still called.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if result.is_err() {
                tracing::warn!(
                    listener_index = index,
                    source = event.source(),
                    event_type = event.event_type(),
                    "event listener panicked"
                );
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: GatewayEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A simple function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: GatewayEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
