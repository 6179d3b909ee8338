//! Unified error types for the commerce transactional core.
//!
//! Every business operation returns a [`ServiceError`] classified into the
//! `Kind` taxonomy the retry policy and callers dispatch on: client errors
//! that are never retried, `InsufficientStock`/`InvalidSignature` that the
//! caller interprets, `TransientUpstream` that workers retry with backoff,
//! and `Fatal` that should crash the worker loop rather than be swallowed.

use thiserror::Error;
use uuid::Uuid;

pub mod database;
pub mod validation;

pub use database::DatabaseError;
pub use validation::ValidationError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Coarse classification used by retry policies and worker error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    InvalidTransition,
    Conflict,
    InsufficientStock,
    InvalidSignature,
    TransientUpstream,
    Fatal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("insufficient stock for variant {variant_id}: requested {requested}, available {available}")]
    InsufficientStock {
        variant_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("transient upstream failure: {message}")]
    TransientUpstream {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("fatal error: {message}")]
    Fatal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } | Self::Validation(_) => ErrorKind::InvalidInput,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::InvalidSignature => ErrorKind::InvalidSignature,
            Self::TransientUpstream { .. } => ErrorKind::TransientUpstream,
            Self::Fatal { .. } => ErrorKind::Fatal,
            Self::Database(db) => {
                if db.is_retryable() {
                    ErrorKind::TransientUpstream
                } else {
                    ErrorKind::Fatal
                }
            }
        }
    }

    /// Whether a worker should reschedule the job rather than DLQ it immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientUpstream)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientUpstream {
            message: message.into(),
            source: None,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
            source: None,
        }
    }

    /// Log at the severity appropriate for the error's kind.
    pub fn log(&self) {
        match self.kind() {
            ErrorKind::InvalidInput | ErrorKind::NotFound | ErrorKind::InvalidTransition => {
                tracing::debug!(error = %self, "rejected request");
            }
            ErrorKind::Conflict | ErrorKind::InsufficientStock | ErrorKind::InvalidSignature => {
                tracing::info!(error = %self, "business rule rejected operation");
            }
            ErrorKind::TransientUpstream => {
                tracing::warn!(error = %self, "transient failure, will retry");
            }
            ErrorKind::Fatal => {
                tracing::error!(error = %self, "fatal error");
            }
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(DatabaseError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_is_not_retryable() {
        let err = ServiceError::InsufficientStock {
            variant_id: Uuid::nil(),
            requested: 5,
            available: 1,
        };
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
    }

    #[test]
    fn transient_upstream_is_retryable() {
        let err = ServiceError::transient("broker unavailable");
        assert!(err.is_retryable());
    }
}
