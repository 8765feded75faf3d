use thiserror::Error;

/// Errors from the worker lifecycle API.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// `start` was called while the worker body is still active.
    #[error("worker '{0}' is already running")]
    AlreadyRunning(String),

    /// `join` was called on a worker that was never started.
    #[error("worker '{0}' was never started")]
    NeverStarted(String),

    /// A worker name was registered twice with the supervisor.
    #[error("worker name '{0}' is already registered")]
    DuplicateName(String),
}

/// Result of waiting for a worker body to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The body exited within the timeout.
    Completed,
    /// The timeout elapsed with the body still running.
    TimedOut,
}
