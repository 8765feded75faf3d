//! Request router for modelmux.
//!
//! The router owns the dispatch policy: it selects a provider adapter per
//! attempt (by model affinity, health, breaker state, rate headroom, and
//! priority), executes the attempt through the connection pool, records
//! the outcome everywhere it matters, and drives retries with bounded
//! exponential backoff. The response cache is consulted before any
//! upstream work; a hit short-circuits the pipeline.
//!
//! Failure semantics: local rejections (breaker open, no candidates) are
//! never counted as provider failures; upstream failures count against
//! the responsible provider only; a success after retries is a success.

mod backoff;
mod error;
mod router;
mod state;

pub use backoff::BackoffSchedule;
pub use error::RouterError;
pub use router::{ProbeReport, Router};
pub use state::{ProviderHandle, ProviderView};
