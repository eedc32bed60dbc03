//! Error types for pool, protocol and admission operations.

use thiserror::Error;

/// Errors produced by a [`BoundedPool`](crate::core::BoundedPool).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Count was zero, negative, or outside the pool's capacity.
    #[error("invalid argument: {units} units (capacity {capacity}, available {available})")]
    InvalidArgument {
        /// Units passed by the caller.
        units: i64,
        /// Fixed capacity of the pool.
        capacity: u32,
        /// Units available when the call was rejected.
        available: u32,
    },
    /// The pool was closed while the caller was blocked in `acquire`.
    #[error("interrupted while waiting for capacity")]
    Interrupted,
}

/// Errors surfaced by a single admission, release or query intent.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// Bad count, rejected before touching any shared resource.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Connect, write or read against the capacity server failed.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(#[from] std::io::Error),
    /// The server answered `-1` to a positive request.
    #[error("server refused request for {requested} visitors")]
    Rejected {
        /// Visitors that were requested.
        requested: i32,
    },
    /// The server answered with a value inconsistent with the request.
    #[error("protocol mismatch: expected {expected}, got {actual}")]
    ProtocolMismatch {
        /// Response the request called for.
        expected: i32,
        /// Response actually received.
        actual: i32,
    },
    /// Blocking acquisition of the local guide was interrupted.
    #[error("interrupted while waiting for a guide")]
    Interrupted,
}

impl From<PoolError> for AdmissionError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Interrupted => Self::Interrupted,
            invalid @ PoolError::InvalidArgument { .. } => Self::InvalidArgument(invalid.to_string()),
        }
    }
}

/// Configuration could not be parsed or failed validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON or environment value could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
    /// A value is out of its allowed range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_maps_to_admission_error() {
        let err: AdmissionError = PoolError::Interrupted.into();
        assert!(matches!(err, AdmissionError::Interrupted));

        let err: AdmissionError = PoolError::InvalidArgument {
            units: 0,
            capacity: 4,
            available: 4,
        }
        .into();
        assert!(matches!(err, AdmissionError::InvalidArgument(_)));
    }

    #[test]
    fn test_error_display() {
        let err = AdmissionError::ProtocolMismatch {
            expected: 7,
            actual: 3,
        };
        assert_eq!(err.to_string(), "protocol mismatch: expected 7, got 3");

        let err = AdmissionError::Rejected { requested: 12 };
        assert_eq!(err.to_string(), "server refused request for 12 visitors");

        let err = PoolError::InvalidArgument {
            units: -1,
            capacity: 50,
            available: 50,
        };
        assert_eq!(
            err.to_string(),
            "invalid argument: -1 units (capacity 50, available 50)"
        );
    }
}
