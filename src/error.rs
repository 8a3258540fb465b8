//! Error types for the throttle middleware.

use thiserror::Error;

/// Main error type for throttle operations.
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store cannot provide atomic counter semantics
    #[error("Incompatible store: {0}")]
    IncompatibleStore(String),

    /// Cache store I/O errors
    #[error("Store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ThrottleError {
    /// Wrap a backend failure in the `Store` variant.
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ThrottleError::Store(Box::new(err))
    }
}

/// Result type alias for throttle operations.
pub type Result<T> = std::result::Result<T, ThrottleError>;
