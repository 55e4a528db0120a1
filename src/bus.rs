// src/bus.rs
//! Bounded merge point between the log monitors and the dispatcher.
//!
//! Publishing never waits: when the queue is full the newest record is dropped
//! so a burst on one log cannot stall any fetch loop.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

use crate::stats::StatsCollector;
use crate::types::CertRecord;

/// Default number of records the bus can hold
pub const DEFAULT_BUS_CAPACITY: usize = 5000;

/// Create a bus with room for `capacity` records
pub fn event_bus(capacity: usize, stats: StatsCollector) -> (BusPublisher, BusConsumer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (BusPublisher { tx, stats }, BusConsumer { rx })
}

/// Producer side, cloned into every log monitor
#[derive(Clone)]
pub struct BusPublisher {
    tx: mpsc::Sender<CertRecord>,
    stats: StatsCollector,
}

impl BusPublisher {
    /// Queue a record without waiting. Returns false if it was dropped.
    pub fn publish(&self, record: CertRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                self.stats.increment_dropped();
                trace!("Event bus full, dropping record from {}", record.source_log);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Records currently queued
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer side, owned by the dispatcher
pub struct BusConsumer {
    rx: mpsc::Receiver<CertRecord>,
}

impl BusConsumer {
    /// Wait for the next record; `None` once every publisher is gone and the queue is drained
    pub async fn consume(&mut self) -> Option<CertRecord> {
        self.rx.recv().await
    }

    /// Stop accepting records; already queued ones can still be consumed
    pub fn close(&mut self) {
        self.rx.close();
    }
}
