//! Error types for the transport abstraction.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is not established (never connected, or torn down).
    #[error("Not connected")]
    NotConnected,

    /// A publish could not be queued (buffer full, client closed, etc.)
    #[error("Publish failed: {0}")]
    Publish(String),

    /// The broker refused or dropped the connection attempt.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// The broker did not acknowledge within the allotted time.
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Payload encoding failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TransportError {
    /// Creates a publish error.
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    /// Creates a connect error.
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }

    /// Creates a timeout error from the elapsed budget.
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout(after.as_millis() as u64)
    }
}
