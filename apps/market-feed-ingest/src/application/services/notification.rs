//! Notification Monitor
//!
//! Periodically checks the success signal and tells the downstream consumer
//! that fresh data has landed. One notification attempt per cycle.
//!
//! The poll interval starts at the default. A successful notification
//! clears the signal and restores the default; a failed notification and an
//! idle cycle both switch to the shorter interval.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::ports::Notifier;
use crate::domain::SuccessSignal;
use crate::infrastructure::config::NotificationSettings;
use crate::infrastructure::metrics::{self, Outcome};

/// Result of one monitor cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was delivered since the last successful notification.
    Idle,
    /// Notification sent; signal cleared.
    Notified,
    /// Notification failed; signal left set.
    Failed,
}

/// Success signal watcher.
pub struct NotificationMonitor {
    notifier: Arc<dyn Notifier>,
    signal: SuccessSignal,
    default_interval: Duration,
    short_interval: Duration,
    interval: Duration,
    cancel: CancellationToken,
}

impl NotificationMonitor {
    /// Create a monitor starting at the default interval.
    #[must_use]
    pub fn new(
        notifier: Arc<dyn Notifier>,
        signal: SuccessSignal,
        settings: &NotificationSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            notifier,
            signal,
            default_interval: settings.default_interval,
            short_interval: settings.short_interval,
            interval: settings.default_interval,
            cancel,
        }
    }

    /// Interval the next cycle will sleep for.
    #[must_use]
    pub const fn current_interval(&self) -> Duration {
        self.interval
    }

    /// Check the signal once and adjust the interval.
    pub async fn poll_once(&mut self) -> PollOutcome {
        if !self.signal.is_set() {
            tracing::info!("No new data delivered since last check");
            self.interval = self.short_interval;
            return PollOutcome::Idle;
        }

        match self.notifier.notify().await {
            Ok(()) => {
                self.signal.clear();
                self.interval = self.default_interval;
                metrics::record_notification(Outcome::Success);
                tracing::info!("Downstream notified of data delivery");
                PollOutcome::Notified
            }
            Err(e) => {
                self.interval = self.short_interval;
                metrics::record_notification(Outcome::Failure);
                tracing::error!(error = %e, "Downstream notification failed");
                PollOutcome::Failed
            }
        }
    }

    /// Run until cancelled: sleep, then poll.
    pub async fn run(mut self) {
        tracing::info!(
            default_secs = self.default_interval.as_secs(),
            short_secs = self.short_interval.as_secs(),
            "Notification monitor started"
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
            let _ = self.poll_once().await;
        }

        tracing::info!("Notification monitor stopped");
    }
}
