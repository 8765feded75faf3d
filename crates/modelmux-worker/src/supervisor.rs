//! Worker registry and orderly shutdown.

use crate::error::{JoinOutcome, WorkerError};
use crate::worker::{BodyError, Worker, WorkerContext, WorkerInfo, WorkerStatus};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Supervisor tuning knobs.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// A running worker whose activity age exceeds this is flagged
    /// unhealthy.
    pub stall_threshold: Duration,
    /// Interval of the optional health-monitor worker.
    pub monitor_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stall_threshold: Duration::from_secs(120),
            monitor_interval: Duration::from_secs(30),
        }
    }
}

/// Owns the set of workers; names are unique.
pub struct Supervisor {
    config: SupervisorConfig,
    workers: Mutex<HashMap<String, Arc<Worker>>>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers and starts a worker. Fails on duplicate names.
    pub fn spawn<F, Fut>(
        &self,
        name: &str,
        description: &str,
        body: F,
    ) -> Result<Arc<Worker>, WorkerError>
    where
        F: FnOnce(WorkerContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BodyError>> + Send + 'static,
    {
        let worker = Arc::new(Worker::new(name, description));
        {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            if workers.contains_key(name) {
                return Err(WorkerError::DuplicateName(name.to_string()));
            }
            workers.insert(name.to_string(), Arc::clone(&worker));
        }
        worker.start(body)?;
        tracing::info!(worker = name, "worker spawned");
        Ok(worker)
    }

    /// Snapshot of every registered worker.
    pub fn list(&self) -> Vec<WorkerInfo> {
        let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        workers.values().map(|w| w.info()).collect()
    }

    /// Workers that look unhealthy: stalled while running, or in a
    /// terminal error/timeout state.
    pub fn health(&self) -> Vec<WorkerInfo> {
        self.list()
            .into_iter()
            .filter(|info| {
                if info.status.is_terminal() {
                    return true;
                }
                info.status == WorkerStatus::Running
                    && info
                        .activity_age
                        .is_some_and(|age| age > self.config.stall_threshold)
            })
            .collect()
    }

    /// Requests stop on all workers concurrently, waits up to `timeout`
    /// per worker, and returns the count that failed to stop cleanly.
    /// Those are force-retired: their handles are released and the tasks
    /// are logged as leaked.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        let workers: Vec<Arc<Worker>> = {
            let mut guard = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain().map(|(_, w)| w).collect()
        };

        for worker in &workers {
            worker.request_stop();
        }

        let joins = workers.iter().map(|worker| async move {
            match worker.join(timeout).await {
                Ok(JoinOutcome::Completed) => true,
                Ok(JoinOutcome::TimedOut) => {
                    tracing::warn!(
                        worker = worker.name(),
                        timeout_ms = timeout.as_millis() as u64,
                        "worker failed to stop; leaking its task"
                    );
                    worker.release_handle().await;
                    false
                }
                // Never started: nothing to wait for.
                Err(_) => true,
            }
        });

        let results = futures::future::join_all(joins).await;
        let leaked = results.iter().filter(|clean| !**clean).count();
        if leaked > 0 {
            tracing::warn!(leaked, "shutdown finished with leaked workers");
        } else {
            tracing::info!(stopped = results.len(), "all workers stopped cleanly");
        }
        leaked
    }

    /// Spawns a worker that periodically runs `health()` and warns about
    /// anything it finds.
    pub fn start_health_monitor(self: &Arc<Self>) -> Result<Arc<Worker>, WorkerError> {
        let supervisor = Arc::clone(self);
        let interval = self.config.monitor_interval;
        self.spawn("health-monitor", "periodic worker health sweep", move |ctx| async move {
            while !ctx.stop.is_stopped() {
                for info in supervisor.health() {
                    if info.name == "health-monitor" {
                        continue;
                    }
                    tracing::warn!(
                        worker = %info.name,
                        status = info.status.as_str(),
                        activity_age_ms = info.activity_age.map(|a| a.as_millis() as u64),
                        last_error = info.last_error.as_deref(),
                        "unhealthy worker"
                    );
                }
                ctx.heartbeat.beat();
                ctx.stop.stopped_or(interval).await;
            }
            Ok(())
        })
    }
}
