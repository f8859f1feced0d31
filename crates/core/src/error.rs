//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures. Storage concerns
/// belong to the infra layer, which wraps this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced PR, project, supplier, quotation, handover, request or inventory
    /// item does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Illegal state transition, missing required field, insufficient stock,
    /// over-fulfillment.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Duplicate document number, duplicate inventory key, stale aggregate version.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Ownership check failed (e.g. a requester reading someone else's request).
    #[error("forbidden: {0}")]
    Forbidden(String),
}

/// Stable, transport-facing error classification.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Conflict,
    Forbidden,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Internal => "internal",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DomainError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Error raised for a transition attempted from the wrong state.
    pub fn invalid_transition(action: &str, required: &str, actual: impl core::fmt::Display) -> Self {
        Self::BadRequest(format!(
            "cannot {action}: status must be {required} (current: {actual})"
        ))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::BadRequest(_) => ErrorKind::BadRequest,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::Forbidden(_) => ErrorKind::Forbidden,
        }
    }

    /// Human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            DomainError::NotFound(m)
            | DomainError::BadRequest(m)
            | DomainError::Conflict(m)
            | DomainError::Forbidden(m) => m,
        }
    }
}
