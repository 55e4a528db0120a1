// src/ct_log/monitor.rs
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::health::LogHealthTracker;
use super::source::{CancelSignal, LogSource, sleep_or_cancelled};
use super::types::{LogDescriptor, LogEntry};
use crate::bus::BusPublisher;
use crate::cert_parser::CertDecoder;

/// Monitors a single CT log for new entries
pub struct LogMonitor {
    log: LogDescriptor,
    source: Arc<dyn LogSource>,
    decoder: Arc<dyn CertDecoder>,
    publisher: BusPublisher,
    health_tracker: Arc<LogHealthTracker>,
    fetch_backoff: Duration,
}

impl LogMonitor {
    pub fn new(
        log: LogDescriptor,
        source: Arc<dyn LogSource>,
        decoder: Arc<dyn CertDecoder>,
        publisher: BusPublisher,
        health_tracker: Arc<LogHealthTracker>,
        fetch_backoff: Duration,
    ) -> Self {
        Self {
            log,
            source,
            decoder,
            publisher,
            health_tracker,
            fetch_backoff,
        }
    }

    pub fn log(&self) -> &LogDescriptor {
        &self.log
    }

    /// Main monitoring loop: start at the current head and follow the log until cancelled.
    ///
    /// Returns an error only when the head cannot be read at startup.
    pub async fn run(&self, cancel: CancelSignal) -> Result<()> {
        let url = &self.log.url;

        let mut next_index = match self.source.head(&self.log).await {
            Ok(head) => head,
            Err(e) => {
                self.health_tracker.record_disabled(url, e.to_string());
                return Err(e.context(format!("Failed to read head of {}", self.log)));
            }
        };

        debug!("Monitoring {} from index {}", self.log, next_index);

        loop {
            if *cancel.borrow() {
                break;
            }

            match self.source.fetch_batch(&self.log, next_index, &cancel).await {
                Ok(batch) => {
                    self.health_tracker.record_success(url);

                    let fetched = batch.entries.len();
                    let counts = self.process_entries(&batch.entries, next_index);
                    if fetched > 0 {
                        trace!(
                            "{}: entries {}..{} fetched={} published={} precerts={}",
                            url, next_index, batch.next_index, fetched, counts.published, counts.precerts
                        );
                    }

                    next_index = batch.next_index;
                }
                Err(e) => {
                    let failures = self.health_tracker.record_failure(url, e.to_string());
                    warn!(
                        "Error fetching {} at index {} ({} in a row): {:#}. Retrying in {:?}",
                        url, next_index, failures, e, self.fetch_backoff
                    );

                    if sleep_or_cancelled(self.fetch_backoff, &cancel).await {
                        break;
                    }
                }
            }
        }

        info!("Monitor for {} stopped", url);
        Ok(())
    }

    /// Decode a batch and publish every certificate naming at least one domain
    fn process_entries(&self, entries: &[LogEntry], first_index: u64) -> BatchCounts {
        let mut counts = BatchCounts::default();

        for (offset, entry) in entries.iter().enumerate() {
            let decoded = match self.decoder.decode(entry) {
                Ok(cert) => cert,
                Err(e) => {
                    trace!(
                        "{}: dropping undecodable entry {}: {}",
                        self.log.url,
                        first_index + offset as u64,
                        e
                    );
                    continue;
                }
            };

            if decoded.is_precert {
                counts.precerts += 1;
            }

            let Some(record) = decoded.into_record(&self.log.url) else {
                continue;
            };

            if self.publisher.publish(record) {
                counts.published += 1;
            }
        }

        counts
    }
}

/// Outcome of one decoded batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct BatchCounts {
    /// Records accepted by the bus
    published: usize,
    /// Entries that decoded as precertificates
    precerts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusConsumer, event_bus};
    use crate::cert_parser::DecodedCert;
    use crate::ct_log::health::LogHealth;
    use crate::ct_log::FetchedBatch;
    use crate::stats::StatsCollector;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;
    use tokio::sync::watch;

    /// Decodes `leaf_input` as a comma-separated domain list; "bad" fails, a "pre:"
    /// prefix marks a precertificate
    struct ListDecoder;

    impl CertDecoder for ListDecoder {
        fn decode(&self, entry: &LogEntry) -> Result<DecodedCert> {
            if entry.leaf_input == "bad" {
                anyhow::bail!("undecodable");
            }
            let (leaf, is_precert) = match entry.leaf_input.strip_prefix("pre:") {
                Some(rest) => (rest, true),
                None => (entry.leaf_input.as_str(), false),
            };
            Ok(DecodedCert {
                common_name: None,
                dns_names: leaf
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                not_before: 1,
                not_after: 2,
                issuer: "Fake CA".to_string(),
                is_precert,
            })
        }
    }

    /// Replays scripted fetch results, then reports the log as caught up
    struct ScriptedSource {
        head: Result<u64, String>,
        script: Mutex<VecDeque<Result<Vec<&'static str>, String>>>,
        requested: Mutex<Vec<u64>>,
    }

    impl ScriptedSource {
        fn new(head: Result<u64, String>, script: Vec<Result<Vec<&'static str>, String>>) -> Self {
            Self {
                head,
                script: Mutex::new(script.into()),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<u64> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LogSource for ScriptedSource {
        async fn list_active(&self) -> Result<Vec<LogDescriptor>> {
            Ok(vec![])
        }

        async fn head(&self, _log: &LogDescriptor) -> Result<u64> {
            self.head.clone().map_err(anyhow::Error::msg)
        }

        async fn fetch_batch(
            &self,
            _log: &LogDescriptor,
            from_index: u64,
            cancel: &CancelSignal,
        ) -> Result<FetchedBatch> {
            self.requested.lock().unwrap().push(from_index);
            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some(Ok(leaves)) => Ok(FetchedBatch {
                    next_index: from_index + leaves.len() as u64,
                    entries: leaves
                        .into_iter()
                        .map(|l| LogEntry {
                            leaf_input: l.to_string(),
                            extra_data: String::new(),
                        })
                        .collect(),
                }),
                Some(Err(e)) => Err(anyhow::anyhow!(e)),
                None => {
                    sleep_or_cancelled(Duration::from_millis(10), cancel).await;
                    Ok(FetchedBatch {
                        entries: vec![],
                        next_index: from_index,
                    })
                }
            }
        }
    }

    fn build_monitor(
        source: Arc<ScriptedSource>,
        backoff: Duration,
    ) -> (LogMonitor, BusConsumer, Arc<LogHealthTracker>) {
        let (publisher, consumer) = event_bus(16, StatsCollector::new());
        let health = Arc::new(LogHealthTracker::new());
        let monitor = LogMonitor::new(
            LogDescriptor::new("https://log.example", "Example"),
            source,
            Arc::new(ListDecoder),
            publisher,
            Arc::clone(&health),
            backoff,
        );
        (monitor, consumer, health)
    }

    #[tokio::test]
    async fn test_transient_errors_retry_same_index() {
        let source = Arc::new(ScriptedSource::new(
            Ok(5),
            vec![
                Err("timeout".to_string()),
                Err("502".to_string()),
                Err("reset".to_string()),
                Ok(vec!["a.example.com", "b.example.com"]),
            ],
        ));
        let (monitor, mut consumer, health) = build_monitor(Arc::clone(&source), Duration::from_millis(10));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { monitor.run(cancel_rx).await });

        let first = tokio::time::timeout(Duration::from_secs(2), consumer.consume())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.domains, vec!["a.example.com".to_string()]);
        assert_eq!(first.source_log, "https://log.example");

        // Let it poll once more past the batch
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        let requested = source.requested();
        assert_eq!(&requested[..4], &[5, 5, 5, 5]);
        assert_eq!(requested[4], 7);
        assert_eq!(health.get_status("https://log.example"), LogHealth::Healthy);

        cancel_tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_head_failure_disables_monitor() {
        let source = Arc::new(ScriptedSource::new(Err("unreachable".to_string()), vec![]));
        let (monitor, _consumer, health) = build_monitor(Arc::clone(&source), Duration::from_millis(10));
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let result = monitor.run(cancel_rx).await;

        assert!(result.is_err());
        assert!(source.requested().is_empty());
        assert_eq!(health.get_status("https://log.example"), LogHealth::Disabled);
    }

    #[tokio::test]
    async fn test_undecodable_and_domainless_entries_are_dropped() {
        let source = Arc::new(ScriptedSource::new(
            Ok(0),
            vec![Ok(vec!["bad", "", "keep.example.com"])],
        ));
        let (monitor, mut consumer, _health) = build_monitor(Arc::clone(&source), Duration::from_millis(10));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { monitor.run(cancel_rx).await });

        let record = tokio::time::timeout(Duration::from_secs(2), consumer.consume())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.domains, vec!["keep.example.com".to_string()]);

        cancel_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        // Only one record ever made it onto the bus
        assert!(consumer.consume().await.is_none());
    }

    #[tokio::test]
    async fn test_batch_counts_precerts_and_published_records() {
        let source = Arc::new(ScriptedSource::new(Ok(0), vec![]));
        let (monitor, mut consumer, _health) = build_monitor(source, Duration::from_millis(10));

        let entries: Vec<LogEntry> = ["pre:a.example.com", "b.example.com", "bad", "pre:"]
            .iter()
            .map(|l| LogEntry {
                leaf_input: l.to_string(),
                extra_data: String::new(),
            })
            .collect();

        let counts = monitor.process_entries(&entries, 0);

        assert_eq!(
            counts,
            BatchCounts {
                published: 2,
                precerts: 2
            }
        );
        assert_eq!(consumer.consume().await.unwrap().domains, vec!["a.example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_exits_within_one_interval() {
        let failures = (0..100).map(|_| Err("down".to_string())).collect();
        let source = Arc::new(ScriptedSource::new(Ok(0), failures));
        let backoff = Duration::from_millis(300);
        let (monitor, _consumer, _health) = build_monitor(Arc::clone(&source), backoff);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { monitor.run(cancel_rx).await });

        // Land somewhere inside the first backoff sleep
        tokio::time::sleep(Duration::from_millis(100)).await;
        let cancelled_at = Instant::now();
        cancel_tx.send(true).unwrap();

        let result = tokio::time::timeout(backoff * 2, handle).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert!(cancelled_at.elapsed() <= backoff);
        assert_eq!(source.requested(), vec![0]);
    }
}
