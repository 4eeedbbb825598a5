//! Prometheus Metrics Module
//!
//! Exposes pipeline metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Feed**: frames and records received, reconnects by kind
//! - **Delivery**: flushes by outcome, drained rows by outcome
//! - **Fallback**: inserts, rejections, stored rows
//! - **Notification**: notification calls by outcome
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the already-installed handle.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Feed
    describe_counter!(
        "ingest_frames_received_total",
        "Binary frames received from the market data stream"
    );
    describe_counter!(
        "ingest_records_received_total",
        "Market records decoded and enqueued"
    );
    describe_counter!(
        "ingest_reconnects_total",
        "Feed reconnection attempts by kind"
    );

    // Delivery
    describe_counter!(
        "ingest_flushes_total",
        "Dispatcher flush cycles by outcome"
    );
    describe_counter!(
        "ingest_drained_rows_total",
        "Fallback rows retried by the drain loop, by outcome"
    );
    describe_gauge!("ingest_queue_depth", "Records waiting in the ingest queue");

    // Fallback
    describe_counter!(
        "ingest_fallback_inserts_total",
        "Batches persisted to the fallback store"
    );
    describe_counter!(
        "ingest_fallback_rejections_total",
        "Batches dropped because the fallback store was full"
    );
    describe_gauge!("ingest_fallback_rows", "Rows in the fallback store");

    // Notification
    describe_counter!(
        "ingest_notifications_total",
        "Downstream notifications by outcome"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label shared by delivery-side counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Call succeeded.
    Success,
    /// Call failed.
    Failure,
}

impl Outcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Reconnect path taken by the feed connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectKind {
    /// Transport retried within an authorized session.
    Transport,
    /// Invalid token; re-authorizing after backoff.
    InvalidToken,
    /// Generic authorization or network failure.
    Authorize,
    /// Transport retries exhausted; full re-authorization.
    Session,
}

impl ReconnectKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::InvalidToken => "invalid_token",
            Self::Authorize => "authorize",
            Self::Session => "session",
        }
    }
}

/// Record one binary frame received.
pub fn record_frame_received() {
    counter!("ingest_frames_received_total").increment(1);
}

/// Record records enqueued from one frame.
pub fn record_records_received(count: u64) {
    counter!("ingest_records_received_total").increment(count);
}

/// Record a reconnect.
pub fn record_reconnect(kind: ReconnectKind) {
    counter!("ingest_reconnects_total", "kind" => kind.as_str()).increment(1);
}

/// Record a flush cycle.
pub fn record_flush(outcome: Outcome) {
    counter!("ingest_flushes_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record one drained row.
pub fn record_drained_row(outcome: Outcome) {
    counter!("ingest_drained_rows_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record a notification call.
pub fn record_notification(outcome: Outcome) {
    counter!("ingest_notifications_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record a batch persisted to the fallback store.
pub fn record_fallback_insert() {
    counter!("ingest_fallback_inserts_total").increment(1);
}

/// Record a batch dropped by the fallback row cap.
pub fn record_fallback_rejection() {
    counter!("ingest_fallback_rejections_total").increment(1);
}

/// Update the ingest queue depth.
#[allow(clippy::cast_precision_loss)]
pub fn set_queue_depth(depth: usize) {
    gauge!("ingest_queue_depth").set(depth as f64);
}

/// Update the fallback row count.
#[allow(clippy::cast_precision_loss)]
pub fn set_fallback_rows(rows: u64) {
    gauge!("ingest_fallback_rows").set(rows as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_as_str() {
        assert_eq!(Outcome::Success.as_str(), "success");
        assert_eq!(Outcome::Failure.as_str(), "failure");
    }

    #[test]
    fn reconnect_kind_as_str() {
        assert_eq!(ReconnectKind::Transport.as_str(), "transport");
        assert_eq!(ReconnectKind::InvalidToken.as_str(), "invalid_token");
        assert_eq!(ReconnectKind::Authorize.as_str(), "authorize");
        assert_eq!(ReconnectKind::Session.as_str(), "session");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_received();
        record_records_received(3);
        record_flush(Outcome::Success);
        set_queue_depth(5);
    }
}
