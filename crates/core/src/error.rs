//! Errors shared by every bookkeeping crate.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic failure of a bookkeeping rule.
///
/// Storage and transport failures have their own error types in the crates that
/// own them; this enum only carries outcomes that retrying cannot change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input: a reversed date range, a negative amount, an empty code.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Stored state would break a ledger rule, e.g. a header account with a balance.
    #[error("ledger rule violated: {0}")]
    InvariantViolation(String),

    /// An id string that does not parse as the expected identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The named record does not exist for the company.
    #[error("{0} not found")]
    NotFound(String),

    /// Stale version or a lifecycle step the record is not in a state to take.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// `what` names the record, e.g. `"journal 0190…"`.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
