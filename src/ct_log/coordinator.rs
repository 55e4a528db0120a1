// src/ct_log/coordinator.rs
use anyhow::{Context, Result, bail};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::health::LogHealthTracker;
use super::monitor::LogMonitor;
use super::source::{CancelSignal, LogSource, sleep_or_cancelled};
use crate::bus::BusPublisher;
use crate::cert_parser::CertDecoder;

/// CT Log Coordinator - starts one monitor per active log
pub struct CtLogCoordinator {
    source: Arc<dyn LogSource>,
    decoder: Arc<dyn CertDecoder>,
    health_tracker: Arc<LogHealthTracker>,
    fetch_backoff: Duration,
    health_interval: Duration,
}

/// Handles of the running monitor tasks
pub struct MonitorSet {
    monitors: Vec<JoinHandle<()>>,
    health_task: JoinHandle<()>,
}

impl CtLogCoordinator {
    pub fn new(
        source: Arc<dyn LogSource>,
        decoder: Arc<dyn CertDecoder>,
        fetch_backoff: Duration,
    ) -> Self {
        Self {
            source,
            decoder,
            health_tracker: Arc::new(LogHealthTracker::default()),
            fetch_backoff,
            health_interval: Duration::from_secs(300),
        }
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    pub fn health_tracker(&self) -> Arc<LogHealthTracker> {
        Arc::clone(&self.health_tracker)
    }

    /// Snapshot the roster and spawn a monitor for every log.
    ///
    /// Failing to obtain the roster, or an empty roster, is fatal. `publisher` is moved into
    /// the monitors so the bus closes once all of them have stopped.
    pub async fn start(&self, publisher: BusPublisher, cancel: CancelSignal) -> Result<MonitorSet> {
        let logs = self
            .source
            .list_active()
            .await
            .context("Failed to fetch the CT log list")?;

        if logs.is_empty() {
            bail!("No usable CT logs found");
        }

        info!("Starting {} CT log monitors", logs.len());

        let mut monitors = Vec::with_capacity(logs.len());
        for log in logs {
            let monitor = LogMonitor::new(
                log,
                Arc::clone(&self.source),
                Arc::clone(&self.decoder),
                publisher.clone(),
                Arc::clone(&self.health_tracker),
                self.fetch_backoff,
            );
            let cancel = cancel.clone();

            monitors.push(tokio::spawn(async move {
                if let Err(e) = monitor.run(cancel).await {
                    warn!("Monitor for {} stopped: {:#}", monitor.log(), e);
                }
            }));
        }

        drop(publisher);
        info!("Spawned {} monitor tasks", monitors.len());

        // Periodic health logging
        let health_tracker = Arc::clone(&self.health_tracker);
        let interval = self.health_interval;
        let health_cancel = cancel.clone();
        let health_task = tokio::spawn(async move {
            while !sleep_or_cancelled(interval, &health_cancel).await {
                health_tracker.log_summary();
            }
        });

        Ok(MonitorSet {
            monitors,
            health_task,
        })
    }
}

impl MonitorSet {
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Wait for every monitor to return; they exit on cancellation or head failure
    pub async fn join(self) {
        for handle in self.monitors {
            if let Err(e) = handle.await {
                error!("Monitor task failed: {}", e);
            }
        }
        self.health_task.abort();
        info!("All monitor tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::event_bus;
    use crate::cert_parser::DecodedCert;
    use crate::ct_log::types::{FetchedBatch, LogDescriptor, LogEntry};
    use crate::stats::StatsCollector;
    use async_trait::async_trait;
    use tokio::sync::watch;

    /// Two logs; the second has no readable head
    struct TwoLogs {
        roster_fails: bool,
    }

    #[async_trait]
    impl LogSource for TwoLogs {
        async fn list_active(&self) -> Result<Vec<LogDescriptor>> {
            if self.roster_fails {
                bail!("log list unavailable");
            }
            Ok(vec![
                LogDescriptor::new("https://good.example/log", "good"),
                LogDescriptor::new("https://bad.example/log", "bad"),
            ])
        }

        async fn head(&self, log: &LogDescriptor) -> Result<u64> {
            if log.name == "bad" {
                bail!("503 from get-sth");
            }
            Ok(0)
        }

        async fn fetch_batch(
            &self,
            _log: &LogDescriptor,
            from_index: u64,
            cancel: &CancelSignal,
        ) -> Result<FetchedBatch> {
            sleep_or_cancelled(Duration::from_millis(10), cancel).await;
            Ok(FetchedBatch {
                entries: Vec::new(),
                next_index: from_index,
            })
        }
    }

    struct NoDecode;

    impl CertDecoder for NoDecode {
        fn decode(&self, _entry: &LogEntry) -> Result<DecodedCert> {
            bail!("not a certificate")
        }
    }

    #[tokio::test]
    async fn test_roster_failure_is_fatal() {
        let coordinator = CtLogCoordinator::new(
            Arc::new(TwoLogs { roster_fails: true }),
            Arc::new(NoDecode),
            Duration::from_millis(10),
        );
        let (publisher, _consumer) = event_bus(4, StatsCollector::new());
        let (_tx, rx) = watch::channel(false);

        assert!(coordinator.start(publisher, rx).await.is_err());
    }

    #[tokio::test]
    async fn test_head_failure_disables_only_that_log() {
        let coordinator = CtLogCoordinator::new(
            Arc::new(TwoLogs { roster_fails: false }),
            Arc::new(NoDecode),
            Duration::from_millis(10),
        );
        let health = coordinator.health_tracker();
        let (publisher, _consumer) = event_bus(4, StatsCollector::new());
        let (tx, rx) = watch::channel(false);

        let monitors = coordinator.start(publisher, rx).await.unwrap();
        assert_eq!(monitors.len(), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let counts = health.counts();
        assert_eq!(counts.disabled, 1);
        assert_eq!(counts.healthy, 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), monitors.join())
            .await
            .expect("monitors should stop on cancel");
    }
}
