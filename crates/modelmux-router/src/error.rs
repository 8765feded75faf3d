use thiserror::Error;

/// Errors from the router's provider registry.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("provider '{0}' is already registered")]
    DuplicateProvider(String),

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
}
