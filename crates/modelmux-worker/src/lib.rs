//! Supervised workers for modelmux.
//!
//! A [`Worker`] is a named long-running task with a lifecycle, a cooperative
//! stop signal, and observable health counters. The [`Supervisor`] owns the
//! set of workers and guarantees orderly shutdown.
//!
//! The body of a worker receives a [`WorkerContext`] and is expected to
//! check the stop signal between units of work:
//!
//! ```
//! use modelmux_worker::Worker;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let worker = Worker::new("reaper", "retires idle pool entries");
//! worker
//!     .start(|ctx| async move {
//!         while !ctx.stop.is_stopped() {
//!             // one unit of work
//!             ctx.heartbeat.beat();
//!             ctx.stop.stopped_or(Duration::from_millis(100)).await;
//!         }
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! worker.request_stop();
//! worker.join(Duration::from_secs(1)).await.unwrap();
//! # }
//! ```

mod error;
mod supervisor;
mod worker;

pub use error::{JoinOutcome, WorkerError};
pub use supervisor::{Supervisor, SupervisorConfig};
pub use worker::{
    BodyError, StopSignal, Worker, WorkerContext, WorkerHeartbeat, WorkerInfo, WorkerStatus,
};
