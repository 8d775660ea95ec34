//! Error types for the circuit breaker library.

use thiserror::Error;

/// Result type for circuit breaker operations.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Result type for breaker construction.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Error type for circuit breaker operations.
///
/// Rejections never invoke the protected operation. Operation errors are
/// passed through unchanged after being counted as failures.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open, calls are not permitted.
    #[error("circuit breaker is open")]
    Open,

    /// The circuit is half-open and its single probe is already in flight.
    #[error("too many requests while circuit breaker is half-open")]
    TooManyRequests,

    /// The underlying operation failed.
    #[error("operation error: {0}")]
    Operation(#[source] E),
}

impl<E> BreakerError<E> {
    /// Returns true if the breaker refused the call without running it.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BreakerError::Open | BreakerError::TooManyRequests)
    }

    /// Returns the operation's own error, if the call was admitted.
    pub fn into_operation(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Invalid breaker configuration, reported by
/// [`BreakerBuilder::build`](crate::BreakerBuilder::build).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The open-state timeout was zero.
    #[error("open-state timeout must be greater than zero")]
    ZeroTimeout,
}
