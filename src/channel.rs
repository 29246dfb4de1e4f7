//! Bounded, drop-on-full result channel between guns and the aggregator
//!
//! Producers never wait: a record offered to a full channel is discarded and
//! the loss is logged. The consumer side drains records in arrival order.

use crate::gun::measure::Shot;
use crate::models::Measurement;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, trace};

/// Counters shared by every clone of a [`ResultSender`]
#[derive(Debug, Default)]
struct ChannelStats {
    offered: AtomicU64,
    accepted: AtomicU64,
    dropped: AtomicU64,
    closed: AtomicU64,
}

/// Point-in-time copy of the channel counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelSnapshot {
    /// Records handed to `offer`
    pub offered: u64,
    /// Records that made it into the queue
    pub accepted: u64,
    /// Records discarded because the queue was full
    pub dropped: u64,
    /// Records discarded because the consumer was gone
    pub closed: u64,
}

impl ChannelSnapshot {
    /// Total records that never reached the consumer
    pub fn lost(&self) -> u64 {
        self.dropped + self.closed
    }
}

/// Create a result channel with a fixed capacity
///
/// A capacity of zero is bumped to one since tokio channels cannot be empty.
pub fn result_channel(capacity: usize) -> (ResultSender, ResultReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sender = ResultSender {
        tx,
        stats: Arc::new(ChannelStats::default()),
    };
    (sender, ResultReceiver { rx })
}

/// Producer half, cheap to clone and shared by all workers
#[derive(Debug, Clone)]
pub struct ResultSender {
    tx: mpsc::Sender<Measurement>,
    stats: Arc<ChannelStats>,
}

impl ResultSender {
    /// Push a record without blocking; returns whether it was queued
    pub fn offer(&self, measurement: Measurement) -> bool {
        self.stats.offered.fetch_add(1, Ordering::Relaxed);

        match self.tx.try_send(measurement) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(measurement)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    marker = %measurement.tag,
                    dropped,
                    capacity = self.capacity(),
                    "Result channel is full, measurement dropped (data loss)"
                );
                false
            }
            Err(TrySendError::Closed(measurement)) => {
                self.stats.closed.fetch_add(1, Ordering::Relaxed);
                trace!(marker = %measurement.tag, "Result consumer is gone, measurement dropped");
                false
            }
        }
    }

    /// Open a measurement scope for one shot
    pub fn measure(&self, marker: &str) -> Shot<'_> {
        Shot::open(self, marker)
    }

    /// Run a synchronous body inside a measurement scope
    ///
    /// An `Err` from the body marks the record as failed and is returned
    /// unchanged.
    pub fn measure_with<T, E, F>(&self, marker: &str, body: F) -> std::result::Result<T, E>
    where
        E: std::fmt::Display,
        F: FnOnce(&mut crate::models::ShotRecord) -> std::result::Result<T, E>,
    {
        let mut shot = self.measure(marker);
        match body(&mut shot) {
            Ok(value) => Ok(value),
            Err(err) => Err(shot.fail(err)),
        }
    }

    /// Records currently queued
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed capacity chosen at construction
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Whether the consumer has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            offered: self.stats.offered.load(Ordering::Relaxed),
            accepted: self.stats.accepted.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            closed: self.stats.closed.load(Ordering::Relaxed),
        }
    }
}

/// Consumer half; there is exactly one
#[derive(Debug)]
pub struct ResultReceiver {
    rx: mpsc::Receiver<Measurement>,
}

impl ResultReceiver {
    /// Next record, or `None` once every sender is gone and the queue is empty
    pub async fn drain(&mut self) -> Option<Measurement> {
        self.rx.recv().await
    }

    /// Next record if one is queued right now
    pub fn try_drain(&mut self) -> Option<Measurement> {
        self.rx.try_recv().ok()
    }

    /// Records currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
