//! Feed Connection Status
//!
//! Shared view of the connector's state and counters, written by the
//! connector and read by the health endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Connector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No session; waiting to (re)start the cycle.
    #[default]
    Disconnected,
    /// Acquiring a token or calling the authorize endpoint.
    Authorizing,
    /// Opening the stream or waiting for the leading frames.
    Connecting,
    /// Receiving live frames.
    Streaming,
}

/// Shared feed status.
#[derive(Debug, Default)]
pub struct FeedStatus {
    state: parking_lot::RwLock<ConnectionState>,
    last_frame_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    last_error: parking_lot::RwLock<Option<String>>,
    frames_received: AtomicU64,
    records_received: AtomicU64,
    reconnects: AtomicU64,
}

impl FeedStatus {
    /// Create a status in the `Disconnected` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Streaming {
            *self.last_error.write() = None;
        }
    }

    /// Remember the most recent failure.
    pub fn set_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    /// Count one frame and the records it produced.
    pub fn record_frame(&self, records: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.records_received.fetch_add(records, Ordering::Relaxed);
        *self.last_frame_at.write() = Some(Utc::now());
    }

    /// Count one reconnect.
    pub fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether live frames are flowing.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state() == ConnectionState::Streaming
    }

    /// Point-in-time copy for reporting.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            state: self.state(),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            records_received: self.records_received.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_frame_at: *self.last_frame_at.read(),
            last_error: self.last_error.read().clone(),
        }
    }
}

/// Serializable copy of [`FeedStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedSnapshot {
    /// Connection state.
    pub state: ConnectionState,
    /// Frames received since start.
    pub frames_received: u64,
    /// Records enqueued since start.
    pub records_received: u64,
    /// Reconnects since start.
    pub reconnects: u64,
    /// When the last frame arrived.
    pub last_frame_at: Option<DateTime<Utc>>,
    /// Most recent failure, cleared once streaming resumes.
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let status = FeedStatus::new();
        assert_eq!(status.state(), ConnectionState::Disconnected);
        assert!(!status.is_streaming());
    }

    #[test]
    fn counts_frames_and_records() {
        let status = FeedStatus::new();
        status.record_frame(3);
        status.record_frame(0);
        status.increment_reconnects();

        let snapshot = status.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.records_received, 3);
        assert_eq!(snapshot.reconnects, 1);
        assert!(snapshot.last_frame_at.is_some());
    }

    #[test]
    fn streaming_clears_last_error() {
        let status = FeedStatus::new();
        status.set_error("boom".to_string());
        assert_eq!(status.snapshot().last_error.as_deref(), Some("boom"));

        status.set_state(ConnectionState::Streaming);
        assert!(status.snapshot().last_error.is_none());
        assert!(status.is_streaming());
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Streaming).unwrap(),
            "\"streaming\""
        );
    }
}
