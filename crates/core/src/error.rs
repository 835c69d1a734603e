//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is recoverable at the caller. Storage and transport failures
/// live in the infra layer; these are the deterministic business failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The entity does not exist (or is not visible to the requesting organization).
    #[error("not found")]
    NotFound,

    /// The operation is illegal for the entity's current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A line item failed arithmetic/validation rules.
    #[error("invalid line item: {0}")]
    InvalidLineItem(String),

    /// Invoice-number or optimistic-lock collision.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Malformed input outside the line-item rules (e.g. an inverted date window).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_line_item(msg: impl Into<String>) -> Self {
        Self::InvalidLineItem(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConcurrencyConflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound => "not_found",
            DomainError::InvalidState(_) => "invalid_state",
            DomainError::InvalidLineItem(_) => "invalid_line_item",
            DomainError::ConcurrencyConflict(_) => "concurrency_conflict",
            DomainError::Validation(_) => "validation_error",
            DomainError::InvalidId(_) => "invalid_id",
        }
    }
}
