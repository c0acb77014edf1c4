//! Error taxonomy for gateway operations.
//!
//! Every caller-facing operation returns `CoreError`: validation failures,
//! missing or foreign-owned entities, lost claim races, and storage faults.
//! Transport-level delivery failures are recorded on ledger rows instead and
//! never surface through this type.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error type for gateway operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input rejected before any state change.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller is not allowed to act on this entity.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Another worker holds the claim on this row.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a not-authorized error.
    pub fn not_authorized(message: impl Into<String>) -> Self {
        Self::NotAuthorized(message.into())
    }

    /// Creates a claim-conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Returns whether the failure is the caller's fault rather than the
    /// gateway's.
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound(_) | Self::NotAuthorized(_)
        )
    }
}
