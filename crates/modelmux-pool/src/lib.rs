//! Connection pool for modelmux.
//!
//! Shares HTTP client objects among callers keyed by upstream host. The
//! pool enforces a global connection cap; a caller that finds the pool at
//! cap blocks until an entry is released or its deadline elapses. Entries
//! are retired on failure, age, usage count, idle timeout, or shutdown.
//!
//! Fairness is not guaranteed: a blocked caller wakes when any entry is
//! released. The idle reaper is expected to run in a supervised worker.
//!
//! # Example
//!
//! ```no_run
//! use modelmux_pool::ConnectionPool;
//! use modelmux_core::config::PoolConfig;
//! use std::time::{Duration, Instant};
//!
//! # async fn example() -> Result<(), modelmux_pool::PoolError> {
//! let pool = ConnectionPool::new(PoolConfig::default());
//!
//! let deadline = Instant::now() + Duration::from_secs(5);
//! let entry = pool.acquire("api.example.com", deadline).await?;
//! let response = entry
//!     .client()
//!     .get("https://api.example.com/models")
//!     .send()
//!     .await;
//! pool.release(entry, response.is_ok());
//! # Ok(())
//! # }
//! ```

mod error;
mod events;
mod pool;

pub use error::PoolError;
pub use events::{PoolEvent, RetireReason};
pub use pool::{ConnectionPool, PoolEntry, PoolStats};
