// src/stats.rs
//! Statistics tracking for crtmon

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    dropped: AtomicU64,
    matches: AtomicU64,
    flushes: AtomicU64,
    delivered: AtomicU64,
    delivery_failures: AtomicU64,
}

/// Thread-safe statistics collector; clones share the same counters
#[derive(Clone)]
pub struct StatsCollector {
    counters: Arc<Counters>,
    start_time: Instant,
}

/// Snapshot of statistics at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    /// Certificate records taken off the bus
    pub processed: u64,
    /// Records dropped because the bus was full
    pub dropped: u64,
    pub matches: u64,
    pub flushes: u64,
    pub delivered: u64,
    pub delivery_failures: u64,
    pub certs_per_minute: f64,
    pub uptime_secs: u64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            start_time: Instant::now(),
        }
    }

    pub fn increment_processed(&self) {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dropped(&self) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_matches(&self) {
        self.counters.matches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_flushes(&self) {
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_delivered(&self) {
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_delivery_failures(&self) {
        self.counters.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.start_time.elapsed();
        let processed = self.counters.processed.load(Ordering::Relaxed);

        let rate = if elapsed.as_secs() > 0 {
            (processed as f64 / elapsed.as_secs() as f64) * 60.0
        } else {
            0.0
        };

        StatsSnapshot {
            processed,
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            matches: self.counters.matches.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            delivery_failures: self.counters.delivery_failures.load(Ordering::Relaxed),
            certs_per_minute: rate,
            uptime_secs: elapsed.as_secs(),
        }
    }

    /// Format statistics as a human-readable string
    pub fn format_stats(&self) -> String {
        let s = self.snapshot();
        format!(
            "{} processed | {} dropped | {} matches | {} batches ({} delivered, {} failed) | {:.1} certs/min | uptime: {}",
            s.processed,
            s.dropped,
            s.matches,
            s.flushes,
            s.delivered,
            s.delivery_failures,
            s.certs_per_minute,
            Self::format_uptime(s.uptime_secs)
        )
    }

    /// Format uptime duration
    pub fn format_uptime(secs: u64) -> String {
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
