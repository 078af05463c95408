//! Downstream sinks for decoded records

use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError};
use tokio_stream::wrappers::ReceiverStream;

use crate::types::ReadoutRecord;
use crate::{ReadoutError, Result};

/// Bounded destination for decoded records.
#[async_trait::async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Name used in logs and telemetry.
    fn name(&self) -> &str;

    /// Enqueue one record, waiting at most `timeout` for room.
    ///
    /// Returns:
    /// - `Ok(())` - The record was accepted
    /// - `Err(ReadoutError::SinkTimeout)` - No room within the timeout; the record is not retained
    /// - `Err(ReadoutError::SinkClosed)` - The consumer is gone
    async fn send(&self, record: ReadoutRecord, timeout: Duration) -> Result<()>;
}

/// Sink backed by a bounded tokio queue.
#[derive(Debug, Clone)]
pub struct QueueSink {
    name: String,
    tx: mpsc::Sender<ReadoutRecord>,
}

/// Consumer side of a [`QueueSink`].
#[derive(Debug)]
pub struct RecordReceiver {
    rx: mpsc::Receiver<ReadoutRecord>,
}

impl QueueSink {
    /// Create a sink holding at most `capacity` undelivered records.
    pub fn bounded(name: impl Into<String>, capacity: usize) -> (Self, RecordReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { name: name.into(), tx }, RecordReceiver { rx })
    }

    /// Free slots in the queue.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

#[async_trait::async_trait]
impl Sink for QueueSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, record: ReadoutRecord, timeout: Duration) -> Result<()> {
        self.tx.send_timeout(record, timeout).await.map_err(|e| match e {
            SendTimeoutError::Timeout(_) => ReadoutError::SinkTimeout { sink: self.name.clone(), timeout },
            SendTimeoutError::Closed(_) => ReadoutError::SinkClosed { sink: self.name.clone() },
        })
    }
}

impl RecordReceiver {
    /// Wait for the next record; `None` once every sender is gone and the queue is empty.
    pub async fn recv(&mut self) -> Option<ReadoutRecord> {
        self.rx.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv). Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<ReadoutRecord> {
        self.rx.blocking_recv()
    }

    /// Take a record if one is queued.
    pub fn try_recv(&mut self) -> Option<ReadoutRecord> {
        match self.rx.try_recv() {
            Ok(record) => Some(record),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Records currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Consume the receiver as a `futures::Stream` of records.
    pub fn into_stream(self) -> impl Stream<Item = ReadoutRecord> + Send + Unpin {
        ReceiverStream::new(self.rx)
    }
}
