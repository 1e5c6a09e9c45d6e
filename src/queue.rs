//! Bounded hand-off between request handlers and the indexing sink.
//!
//! The queue is built once at startup with [`IndexQueue::bounded`]. The
//! [`IndexSender`] half is cloned into every request handler; the single
//! [`IndexReceiver`] is owned by the sink. When every sender has been dropped
//! the receiver drains what is left and then reports the queue as closed.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Capacity used when nothing else is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("index queue capacity must be at least 1")]
    ZeroCapacity,

    #[error("index queue is closed")]
    Closed,
}

/// A serialized report waiting to be indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedReport {
    pub guid: String,
    /// Bounded type label, for logs and metrics.
    pub label: &'static str,
    /// Wire-encoded report, exactly as it will be written to the index.
    pub body: Bytes,
}

impl QueuedReport {
    pub fn new(guid: impl Into<String>, label: &'static str, body: impl Into<Bytes>) -> Self {
        Self {
            guid: guid.into(),
            label,
            body: body.into(),
        }
    }
}

/// Constructor namespace for the queue halves.
pub struct IndexQueue;

impl IndexQueue {
    /// Create a FIFO queue holding at most `capacity` reports.
    pub fn bounded(capacity: usize) -> Result<(IndexSender, IndexReceiver), QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        let (tx, rx) = mpsc::channel(capacity);
        Ok((IndexSender { tx }, IndexReceiver { rx }))
    }
}

/// Producer half. Cheap to clone.
#[derive(Debug, Clone)]
pub struct IndexSender {
    tx: mpsc::Sender<QueuedReport>,
}

impl IndexSender {
    /// Push a report, waiting for a free slot while the queue is full.
    ///
    /// Fails only when the receiver is gone.
    pub async fn enqueue(&self, report: QueuedReport) -> Result<(), QueueError> {
        self.tx.send(report).await.map_err(|_| QueueError::Closed)?;
        metrics::gauge!("perfreport_queue_depth").set(self.depth() as f64);
        Ok(())
    }

    /// Reports currently waiting in the queue.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the indexing sink.
#[derive(Debug)]
pub struct IndexReceiver {
    rx: mpsc::Receiver<QueuedReport>,
}

impl IndexReceiver {
    /// Next report in FIFO order, waiting while the queue is empty.
    ///
    /// Returns `None` once all senders are dropped and the queue is drained.
    pub async fn dequeue(&mut self) -> Option<QueuedReport> {
        let report = self.rx.recv().await?;
        metrics::gauge!("perfreport_queue_depth").set(self.rx.len() as f64);
        Some(report)
    }

    /// Stop accepting new reports; queued ones can still be dequeued.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
