//! Relaycast error type.
//!
//! Request-level failures only. Per-unit delivery failures are carried as
//! [`crate::types::SendError`] values and recorded in the ledger — they never
//! surface through this enum.

use thiserror::Error;

/// Result alias used across all Relaycast crates.
pub type Result<T> = std::result::Result<T, RelaycastError>;

/// Errors that abort a whole dispatch/retry operation.
#[derive(Debug, Error)]
pub enum RelaycastError {
    /// Configuration error (bad file, failed validation).
    #[error("Config error: {0}")]
    Config(String),

    /// Delivery ledger (SQLite) error.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Channel-level error outside the per-unit send path.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Campaign (or other record) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller's tenant does not own the campaign.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed request (e.g. empty campaign id).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelaycastError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}
