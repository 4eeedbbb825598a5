//! Port Interfaces
//!
//! Driven ports the delivery services depend on. Infrastructure adapters
//! implement them over HTTP; tests substitute mocks.
//!
//! - `Sink`: the time-series write endpoint and its health probe
//! - `Notifier`: the downstream consumer told that fresh data has landed

use async_trait::async_trait;

use crate::domain::BatchPayload;

/// Error returned by a failed sink write.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The request never produced a response.
    #[error("sink unreachable: {0}")]
    Transport(String),

    /// The sink answered with a non-success status.
    #[error("sink rejected write ({status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

/// Error returned by a failed notification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    /// The request never produced a response.
    #[error("notification target unreachable: {0}")]
    Transport(String),

    /// The target answered with something other than 200.
    #[error("notification rejected with status {0}")]
    Rejected(u16),
}

/// Time-series sink.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sink: Send + Sync {
    /// Write one batch. Any error means the batch was not accepted.
    async fn write(&self, payload: &BatchPayload) -> Result<(), SinkError>;

    /// Probe the sink's health endpoint. Never errors; unreachable is unhealthy.
    async fn is_healthy(&self) -> bool;
}

/// Downstream notification target.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announce that data was delivered. One attempt, no internal retry.
    async fn notify(&self) -> Result<(), NotifyError>;
}
