//! Ingest Queue
//!
//! Bounded FIFO between the feed connector (single producer) and the batch
//! dispatcher (single consumer). `put` suspends while the queue is full, so a
//! stalled dispatcher stalls frame consumption from the transport instead of
//! dropping records.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::domain::MarketRecord;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// The consumer side was dropped; nothing will ever drain the queue again.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("ingest queue closed")]
pub struct QueueClosed;

/// Create a bounded queue with the given capacity.
///
/// A capacity of zero is raised to one.
#[must_use]
pub fn ingest_queue(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (QueueProducer { tx }, QueueConsumer { rx, capacity })
}

/// Producer handle.
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: mpsc::Sender<MarketRecord>,
}

impl QueueProducer {
    /// Enqueue a record, waiting for room if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if the consumer has gone away.
    pub async fn put(&self, record: MarketRecord) -> Result<(), QueueClosed> {
        self.tx.send(record).await.map_err(|_| QueueClosed)
    }

    /// Number of records currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer handle.
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<MarketRecord>,
    capacity: usize,
}

impl QueueConsumer {
    /// Number of records currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove and return every record queued at the time of the call, in
    /// arrival order. Never waits.
    pub fn drain(&mut self) -> Vec<MarketRecord> {
        let pending = self.rx.len();
        let mut records = Vec::with_capacity(pending);

        while records.len() < pending {
            match self.rx.try_recv() {
                Ok(record) => records.push(record),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        records
    }

    /// Wait for the next record. Returns `None` once every producer is gone
    /// and the queue is empty.
    pub async fn recv(&mut self) -> Option<MarketRecord> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::{assert_pending, assert_ready_ok, task};

    use super::*;

    fn record(ts: i64) -> MarketRecord {
        MarketRecord::new("NSE_EQ|X", "I1", ts).with_volume(ts)
    }

    #[tokio::test]
    async fn drain_preserves_fifo_order() {
        let (producer, mut consumer) = ingest_queue(8);
        for ts in 0..5 {
            producer.put(record(ts)).await.unwrap();
        }

        let drained = consumer.drain();
        let stamps: Vec<i64> = drained.iter().map(|r| r.timestamp_ms).collect();

        assert_eq!(stamps, vec![0, 1, 2, 3, 4]);
        assert!(consumer.is_empty());
    }

    #[tokio::test]
    async fn put_on_full_queue_waits_for_room() {
        let (producer, mut consumer) = ingest_queue(2);
        producer.put(record(0)).await.unwrap();
        producer.put(record(1)).await.unwrap();
        assert_eq!(consumer.len(), 2);

        let mut blocked = task::spawn(producer.put(record(2)));
        assert_pending!(blocked.poll());
        assert_eq!(consumer.len(), 2);

        let first = consumer.recv().await.unwrap();
        assert_eq!(first.timestamp_ms, 0);

        assert!(blocked.is_woken());
        assert_ready_ok!(blocked.poll());
        assert_eq!(consumer.len(), 2);
    }

    #[tokio::test]
    async fn length_never_exceeds_capacity() {
        let (producer, mut consumer) = ingest_queue(4);
        let feeder = tokio::spawn(async move {
            for ts in 0..100 {
                producer.put(record(ts)).await.unwrap();
            }
        });

        let mut seen = Vec::new();
        while seen.len() < 100 {
            assert!(consumer.len() <= consumer.capacity());
            seen.extend(consumer.drain());
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        feeder.await.unwrap();

        let stamps: Vec<i64> = seen.iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(stamps, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn put_fails_once_consumer_dropped() {
        let (producer, consumer) = ingest_queue(1);
        drop(consumer);
        assert!(producer.put(record(0)).await.is_err());
    }

    #[test]
    fn zero_capacity_is_raised() {
        let (producer, consumer) = ingest_queue(0);
        assert_eq!(consumer.capacity(), 1);
        assert!(producer.is_empty());
    }
}
