use thiserror::Error;

/// Errors returned by the connection pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool stayed at cap until the caller's deadline elapsed.
    #[error("no connection available before the deadline")]
    AcquireTimeout,

    /// The pool is shutting down and refuses new acquisitions.
    #[error("pool is shut down")]
    ShutDown,

    /// Building the underlying HTTP client failed.
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}
