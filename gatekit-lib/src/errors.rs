//! Error types for gateway operations.
//!
//! Every fallible operation in this crate returns [`GatewayError`], split
//! along the boundaries callers actually branch on: crypto failures are
//! terminal for a callback, transport failures are retried on the next
//! scheduled run, protocol failures keep the raw response for diagnosis.

use thiserror::Error;

/// Comprehensive error type for gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Key/IV misconfiguration, malformed ciphertext, or authentication
    /// failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Unparseable trade reference. Reserved: the reference extractor is
    /// total and currently never raises this.
    #[error("correlation error: {0}")]
    Correlation(String),

    /// Network/HTTP failure calling the provider.
    #[error("transport error during {operation}: {reason}")]
    Transport {
        /// Operation that failed (e.g. "charge")
        operation: String,
        /// Underlying failure message
        reason: String,
    },

    /// Malformed or incomplete provider response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The order/subscription collaborator rejected the application.
    #[error("business error: {0}")]
    Business(String),
}

impl GatewayError {
    pub fn crypto(reason: impl Into<String>) -> Self {
        Self::Crypto(reason.into())
    }

    pub fn transport(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }

    /// Whether this error came from the transport layer (retryable on the
    /// next scheduled run).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
