//! Metrics aggregation for modelmux.
//!
//! The [`MetricsAggregator`] implements the core
//! [`Observer`](modelmux_core::Observer) capability: the router and
//! gateway post attempt and request records; the aggregator derives
//! per-provider and per-endpoint views (success rates, request rates,
//! latency percentiles, token and cost totals), samples system state, and
//! maintains bounded history rings for dashboard trend lines.
//!
//! The [`SocketHub`] manages dashboard WebSocket connections: a cap on
//! concurrent sockets, pong-based staleness sweeps, and the typed inbound
//! message protocol. A supervised broadcast worker assembles the
//! comprehensive snapshot each interval and fans it out.

mod aggregator;
mod history;
mod hub;

pub use aggregator::MetricsAggregator;
pub use history::HistoryRing;
pub use hub::{HubError, HubReply, SocketHub, SocketId};
