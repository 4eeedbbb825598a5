//! Drain Loop
//!
//! Retries staged payloads against the sink. Each cycle probes the sink's
//! health first and skips the cycle entirely if it is down. Otherwise every
//! row is retried in insertion order; a delivered row is deleted, a failed
//! row stays put and the sweep moves on. The store is compacted after every
//! sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::ports::Sink;
use crate::domain::SuccessSignal;
use crate::infrastructure::fallback::{FallbackError, FallbackStore};
use crate::infrastructure::metrics::{self, Outcome};

/// Summary of one drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// The sink was unhealthy and nothing was attempted.
    pub skipped: bool,
    /// Rows attempted.
    pub attempted: usize,
    /// Rows delivered and deleted.
    pub delivered: usize,
    /// Rows that failed and remain staged.
    pub failed: usize,
}

/// Background redelivery of fallback rows.
pub struct DrainLoop {
    store: FallbackStore,
    sink: Arc<dyn Sink>,
    signal: SuccessSignal,
    interval: Duration,
    cancel: CancellationToken,
}

impl DrainLoop {
    /// Create a drain loop.
    #[must_use]
    pub fn new(
        store: FallbackStore,
        sink: Arc<dyn Sink>,
        signal: SuccessSignal,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            sink,
            signal,
            interval,
            cancel,
        }
    }

    /// Run one cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the fallback store fails.
    pub async fn drain_once(&self) -> Result<DrainReport, FallbackError> {
        if !self.sink.is_healthy().await {
            tracing::warn!("Sink unhealthy, skipping drain cycle");
            return Ok(DrainReport {
                skipped: true,
                ..DrainReport::default()
            });
        }

        let rows = self.store.fetch_all().await?;
        let mut report = DrainReport {
            attempted: rows.len(),
            ..DrainReport::default()
        };

        for row in rows {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.sink.write(&row.payload).await {
                Ok(()) => {
                    self.store.delete(row.id).await?;
                    self.signal.set();
                    metrics::record_drained_row(Outcome::Success);
                    report.delivered += 1;
                    tracing::info!(id = row.id, "Staged payload delivered");
                }
                Err(e) => {
                    metrics::record_drained_row(Outcome::Failure);
                    report.failed += 1;
                    tracing::error!(id = row.id, error = %e, "Staged payload redelivery failed");
                }
            }
        }

        self.store.compact().await?;
        metrics::set_fallback_rows(self.store.count().await?);

        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                delivered = report.delivered,
                failed = report.failed,
                "Drain cycle complete"
            );
        }
        Ok(report)
    }

    /// Run until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the fallback store fails.
    pub async fn run(self) -> Result<(), FallbackError> {
        tracing::info!(interval_secs = self.interval.as_secs(), "Drain loop started");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                result = self.drain_once() => { result?; }
            }

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("Drain loop stopped");
        Ok(())
    }
}
