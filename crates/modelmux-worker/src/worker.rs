//! The supervised worker primitive.

use crate::error::{JoinOutcome, WorkerError};
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Error type returned by worker bodies.
pub type BodyError = Box<dyn std::error::Error + Send + Sync>;

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerStatus {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    /// The body returned an error or panicked; terminal.
    Error = 4,
    /// The body failed to exit within a join timeout; terminal.
    Timeout = 5,
}

impl WorkerStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerStatus::Starting,
            2 => WorkerStatus::Running,
            3 => WorkerStatus::Stopping,
            4 => WorkerStatus::Error,
            5 => WorkerStatus::Timeout,
            _ => WorkerStatus::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::Starting => "starting",
            WorkerStatus::Running => "running",
            WorkerStatus::Stopping => "stopping",
            WorkerStatus::Error => "error",
            WorkerStatus::Timeout => "timeout",
        }
    }

    /// True for states a worker never leaves on its own.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerStatus::Error | WorkerStatus::Timeout)
    }
}

/// Read-only stop signal handed to the body.
///
/// The body MUST check this between units of work and exit promptly once
/// it is set.
#[derive(Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once stop has been requested.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // Closed sender implies stop as well.
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Sleeps up to `period`, waking early if stop is requested.
    /// Returns true if stop was requested.
    pub async fn stopped_or(&self, period: Duration) -> bool {
        tokio::select! {
            _ = self.stopped() => true,
            _ = tokio::time::sleep(period) => self.is_stopped(),
        }
    }
}

/// Activity reporter handed to the body; `beat()` marks the end of a unit
/// of work.
#[derive(Clone)]
pub struct WorkerHeartbeat {
    shared: Arc<Shared>,
}

impl WorkerHeartbeat {
    pub fn beat(&self) {
        self.shared.operations.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.shared.last_activity.lock() {
            *last = Instant::now();
        }
    }

    /// Optional self-reported memory footprint for `info()`.
    pub fn set_memory_hint(&self, bytes: u64) {
        self.shared.memory_hint.store(bytes, Ordering::Relaxed);
    }
}

/// Everything a worker body receives.
pub struct WorkerContext {
    pub stop: StopSignal,
    pub heartbeat: WorkerHeartbeat,
}

/// Point-in-time snapshot of a worker.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub name: String,
    pub description: String,
    pub status: WorkerStatus,
    pub uptime: Option<Duration>,
    pub activity_age: Option<Duration>,
    pub operations_completed: u64,
    pub stop_requested: bool,
    pub last_error: Option<String>,
    pub approx_memory_bytes: u64,
}

#[derive(Debug)]
struct Shared {
    name: String,
    description: String,
    status: AtomicU8,
    stop_requested: AtomicBool,
    operations: AtomicU64,
    memory_hint: AtomicU64,
    started_at: Mutex<Option<Instant>>,
    last_activity: Mutex<Instant>,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: WorkerStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn set_error(&self, message: String) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(message);
        }
        self.set_status(WorkerStatus::Error);
    }
}

/// A named, observable long-running task with cooperative stop.
///
/// The primitive never restarts a failed body; supervision policy lives
/// in the [`Supervisor`](crate::Supervisor).
#[derive(Debug)]
pub struct Worker {
    shared: Arc<Shared>,
    stop_tx: watch::Sender<bool>,
    handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Worker {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                description: description.into(),
                status: AtomicU8::new(WorkerStatus::Stopped as u8),
                stop_requested: AtomicBool::new(false),
                operations: AtomicU64::new(0),
                memory_hint: AtomicU64::new(0),
                started_at: Mutex::new(None),
                last_activity: Mutex::new(Instant::now()),
                last_error: Mutex::new(None),
            }),
            stop_tx,
            handle: tokio::sync::Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn status(&self) -> WorkerStatus {
        self.shared.status()
    }

    /// Begins execution of `body`. Fails if the worker is not stopped.
    pub fn start<F, Fut>(&self, body: F) -> Result<(), WorkerError>
    where
        F: FnOnce(WorkerContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BodyError>> + Send + 'static,
    {
        let previous = self.shared.status.compare_exchange(
            WorkerStatus::Stopped as u8,
            WorkerStatus::Starting as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if previous.is_err() {
            return Err(WorkerError::AlreadyRunning(self.shared.name.clone()));
        }

        self.shared.stop_requested.store(false, Ordering::Release);
        let _ = self.stop_tx.send(false);

        let now = Instant::now();
        if let Ok(mut started) = self.shared.started_at.lock() {
            *started = Some(now);
        }
        if let Ok(mut last) = self.shared.last_activity.lock() {
            *last = now;
        }

        let context = WorkerContext {
            stop: StopSignal {
                rx: self.stop_tx.subscribe(),
            },
            heartbeat: WorkerHeartbeat {
                shared: Arc::clone(&self.shared),
            },
        };

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            shared.set_status(WorkerStatus::Running);
            tracing::debug!(worker = %shared.name, "worker started");

            let result = std::panic::AssertUnwindSafe(body(context))
                .catch_unwind()
                .await;

            match result {
                Ok(Ok(())) => {
                    shared.set_status(WorkerStatus::Stopped);
                    tracing::debug!(worker = %shared.name, "worker exited cleanly");
                }
                Ok(Err(error)) => {
                    tracing::error!(worker = %shared.name, error = %error, "worker body failed");
                    shared.set_error(error.to_string());
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&'static str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string());
                    tracing::error!(worker = %shared.name, panic = %message, "worker body panicked");
                    shared.set_error(format!("panic: {message}"));
                }
            }
        });

        // start() is only callable from a runtime context, so the handle
        // slot is free here: any previous task has already been reaped or
        // abandoned by a terminal transition.
        if let Ok(mut slot) = self.handle.try_lock() {
            *slot = Some(task);
        }

        Ok(())
    }

    /// Sets the stop signal; does not block or wait.
    pub fn request_stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
        if self.shared.status() == WorkerStatus::Running {
            self.shared.set_status(WorkerStatus::Stopping);
        }
        let _ = self.stop_tx.send(true);
    }

    /// Waits up to `timeout` for the body to exit.
    ///
    /// On timeout the body keeps running; the worker is marked `Timeout`
    /// only when a stop had been requested, since then the contract
    /// (exit promptly) has been broken.
    pub async fn join(&self, timeout: Duration) -> Result<JoinOutcome, WorkerError> {
        let mut guard = self.handle.lock().await;
        let Some(handle) = guard.as_mut() else {
            return Err(WorkerError::NeverStarted(self.shared.name.clone()));
        };

        match tokio::time::timeout(timeout, &mut *handle).await {
            Ok(_) => {
                *guard = None;
                Ok(JoinOutcome::Completed)
            }
            Err(_) => {
                if self.shared.stop_requested.load(Ordering::Acquire) {
                    self.shared.set_status(WorkerStatus::Timeout);
                }
                Ok(JoinOutcome::TimedOut)
            }
        }
    }

    /// Abandons the task handle after a failed shutdown; the task is
    /// considered leaked and is logged as such by the supervisor.
    pub(crate) async fn release_handle(&self) {
        let mut guard = self.handle.lock().await;
        *guard = None;
    }

    /// Snapshot of the worker's observable state.
    pub fn info(&self) -> WorkerInfo {
        let status = self.shared.status();
        let started_at = self
            .shared
            .started_at
            .lock()
            .ok()
            .and_then(|guard| *guard);
        let uptime = match status {
            WorkerStatus::Stopped => None,
            _ => started_at.map(|at| at.elapsed()),
        };
        let activity_age = match status {
            WorkerStatus::Running | WorkerStatus::Stopping => self
                .shared
                .last_activity
                .lock()
                .ok()
                .map(|guard| guard.elapsed()),
            _ => None,
        };
        WorkerInfo {
            name: self.shared.name.clone(),
            description: self.shared.description.clone(),
            status,
            uptime,
            activity_age,
            operations_completed: self.shared.operations.load(Ordering::Relaxed),
            stop_requested: self.shared.stop_requested.load(Ordering::Acquire),
            last_error: self.shared.last_error.lock().ok().and_then(|g| g.clone()),
            approx_memory_bytes: self.shared.memory_hint.load(Ordering::Relaxed),
        }
    }
}
