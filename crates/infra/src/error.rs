//! Infrastructure error types.

use thiserror::Error;

use toolroom_core::{DomainError, ErrorKind};

/// Storage failures (never business rules).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    Poisoned,

    #[error("database error in {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("async runtime unavailable: {0}")]
    Runtime(String),

    #[error("failed to serialize audit event: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn database(operation: &str, err: impl core::fmt::Display) -> Self {
        StoreError::Database {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }
}

/// Error returned by every engine service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Transport-facing classification; storage failures are `internal`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Domain(e) => e.kind(),
            ServiceError::Store(_) => ErrorKind::Internal,
        }
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            ServiceError::Store(_) => None,
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(value: serde_json::Error) -> Self {
        ServiceError::Store(StoreError::Serialization(value))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_classify_as_internal() {
        let err = ServiceError::from(StoreError::Poisoned);
        assert_eq!(err.kind(), ErrorKind::Internal);

        let err = ServiceError::from(DomainError::forbidden("not yours"));
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.to_string(), "forbidden: not yours");
    }
}
