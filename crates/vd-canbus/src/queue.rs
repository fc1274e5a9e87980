//! Bounded inbound frame queue between the receive loop and the consumer.
//!
//! The producer never blocks: when the queue is full the incoming frame is
//! dropped and counted (drop-newest). The consumer blocks with a timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::{TransportError, TransportResult};
use crate::types::CanFrame;

/// Monotonic transport counters, shared between the receive loop and readers.
#[derive(Debug, Default)]
pub struct TransportStats {
    received: AtomicU64,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    sent: AtomicU64,
    send_failures: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStatsSnapshot {
    pub received: u64,
    pub enqueued: u64,
    pub dropped: u64,
    pub sent: u64,
    pub send_failures: u64,
}

impl TransportStats {
    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Producer half. Cheap to clone; every clone feeds the same queue.
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<CanFrame>,
    stats: Arc<TransportStats>,
}

impl FrameSender {
    /// Enqueue without waiting. A full queue drops `frame` and returns
    /// `QueueFull`; a closed queue returns `NotReady`.
    pub fn push(&self, frame: CanFrame) -> TransportResult<()> {
        match self.tx.try_send(frame) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(TransportError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::NotReady),
        }
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }
}

/// Consumer half.
pub struct FrameReceiver {
    rx: mpsc::Receiver<CanFrame>,
}

impl FrameReceiver {
    /// Pop the oldest frame, waiting up to `timeout`.
    pub async fn pop(&mut self, timeout: Duration) -> TransportResult<CanFrame> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(TransportError::NotReady),
            Err(_) => Err(TransportError::timeout(timeout)),
        }
    }

    /// Number of frames waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Close the queue and discard everything left in it. Returns the number
    /// of discarded frames.
    pub fn drain(&mut self) -> usize {
        self.rx.close();
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}

/// Create a queue holding at most `depth` frames.
///
/// `depth` must be non-zero.
pub fn bounded(depth: usize, stats: Arc<TransportStats>) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::channel(depth);
    (FrameSender { tx, stats }, FrameReceiver { rx })
}
