//! Batch Dispatcher
//!
//! Single consumer of the ingest queue. Every poll interval it checks two
//! triggers:
//!
//! - size: more than `size_threshold` records are queued
//! - age: the queue is non-empty and `max_age` has passed since the last flush
//!
//! A flush drains the whole queue, resets the age reference, renders one
//! payload and makes exactly one write attempt. A failed write persists the
//! payload verbatim as a single fallback row; there is no immediate retry.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::Sink;
use crate::domain::{BatchPayload, SuccessSignal};
use crate::infrastructure::config::BatchSettings;
use crate::infrastructure::fallback::{FallbackError, FallbackStore, InsertOutcome};
use crate::infrastructure::metrics::{self, Outcome};
use crate::infrastructure::queue::QueueConsumer;

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No trigger fired.
    Idle,
    /// Records were drained but none had fields to write.
    Skipped {
        /// Records drained.
        records: usize,
    },
    /// The sink accepted the batch.
    Delivered {
        /// Records drained.
        records: usize,
    },
    /// The sink refused the batch; it was staged for redelivery.
    Persisted {
        /// Records drained.
        records: usize,
        /// Fallback row id.
        id: i64,
    },
    /// The sink refused the batch and the fallback store was full.
    Dropped {
        /// Records drained.
        records: usize,
    },
}

/// Dual-trigger batch dispatcher.
pub struct BatchDispatcher {
    consumer: QueueConsumer,
    sink: Arc<dyn Sink>,
    fallback: FallbackStore,
    signal: SuccessSignal,
    settings: BatchSettings,
    last_flush: Instant,
    cancel: CancellationToken,
}

impl BatchDispatcher {
    /// Create a dispatcher. The age reference starts now.
    #[must_use]
    pub fn new(
        consumer: QueueConsumer,
        sink: Arc<dyn Sink>,
        fallback: FallbackStore,
        signal: SuccessSignal,
        settings: BatchSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            consumer,
            sink,
            fallback,
            signal,
            settings,
            last_flush: Instant::now(),
            cancel,
        }
    }

    /// Whether either trigger holds right now.
    #[must_use]
    pub fn should_flush(&self) -> bool {
        let queued = self.consumer.len();
        let size_trigger = queued > self.settings.size_threshold;
        let age_trigger = queued > 0 && self.last_flush.elapsed() > self.settings.max_age;
        size_trigger || age_trigger
    }

    /// Evaluate the triggers once and flush if either holds.
    ///
    /// # Errors
    ///
    /// Returns an error only if the fallback store itself fails.
    pub async fn poll_once(&mut self) -> Result<FlushOutcome, FallbackError> {
        metrics::set_queue_depth(self.consumer.len());
        if !self.should_flush() {
            return Ok(FlushOutcome::Idle);
        }
        self.flush().await
    }

    /// Run until cancelled, then flush whatever is still queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the fallback store fails.
    pub async fn run(mut self) -> Result<(), FallbackError> {
        tracing::info!(
            size_threshold = self.settings.size_threshold,
            max_age_secs = self.settings.max_age.as_secs(),
            "Batch dispatcher started"
        );

        loop {
            if self.poll_once().await? == FlushOutcome::Idle {
                tokio::select! {
                    () = self.cancel.cancelled() => break,
                    () = tokio::time::sleep(self.settings.poll_interval) => {}
                }
            } else if self.cancel.is_cancelled() {
                break;
            }
        }

        if !self.consumer.is_empty() {
            tracing::info!(queued = self.consumer.len(), "Flushing queue before shutdown");
            self.flush().await?;
        }

        tracing::info!("Batch dispatcher stopped");
        Ok(())
    }

    async fn flush(&mut self) -> Result<FlushOutcome, FallbackError> {
        let records = self.consumer.drain();
        self.last_flush = Instant::now();
        let count = records.len();

        let payload = BatchPayload::from_records(&records);
        if payload.is_empty() {
            tracing::debug!(records = count, "Drained records carried no fields");
            return Ok(FlushOutcome::Skipped { records: count });
        }

        match self.sink.write(&payload).await {
            Ok(()) => {
                self.signal.set();
                metrics::record_flush(Outcome::Success);
                tracing::info!(
                    records = count,
                    lines = payload.line_count(),
                    "Batch delivered"
                );
                Ok(FlushOutcome::Delivered { records: count })
            }
            Err(e) => {
                metrics::record_flush(Outcome::Failure);
                tracing::warn!(error = %e, records = count, "Batch delivery failed, staging in fallback store");

                match self.fallback.insert(&payload).await? {
                    InsertOutcome::Stored(id) => {
                        metrics::record_fallback_insert();
                        Ok(FlushOutcome::Persisted { records: count, id })
                    }
                    InsertOutcome::Rejected { .. } => {
                        metrics::record_fallback_rejection();
                        Ok(FlushOutcome::Dropped { records: count })
                    }
                }
            }
        }
    }
}
