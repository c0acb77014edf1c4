//! Transport-level error types for delivery attempts.
//!
//! These errors describe what went wrong talking to a receiver. They are
//! recorded on the ledger row that was being attempted and never propagate
//! out of a sweep; operation-level failures surface as
//! `vendgros_core::CoreError` instead.

use thiserror::Error;

/// Result type alias using `DeliveryError`.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Failure to complete an HTTP delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Connection failure, DNS failure, or other transport fault.
    #[error("network error: {message}")]
    Network {
        /// Description of the network failure.
        message: String,
    },

    /// The receiver did not respond within the attempt timeout.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Timeout that was exceeded, in seconds.
        timeout_seconds: u64,
    },

    /// The HTTP client could not be constructed.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Returns whether another attempt could plausibly succeed.
    ///
    /// Timeouts and network faults are transient receiver conditions;
    /// configuration errors are ours.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}
