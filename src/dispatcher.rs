// src/dispatcher.rs
//! Single consumer of the event bus: matches every domain of every record against the
//! targets, reports each match and hands it to the coalescer.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bus::BusConsumer;
use crate::coalescer::NotificationCoalescer;
use crate::ct_log::source::CancelSignal;
use crate::matcher::TargetMatcher;
use crate::output::OutputManager;
use crate::stats::StatsCollector;
use crate::types::{CertRecord, MatchEvent, MatchResult};

pub struct Dispatcher {
    matcher: TargetMatcher,
    output: OutputManager,
    coalescer: Option<Arc<NotificationCoalescer>>,
    stats: StatsCollector,
}

impl Dispatcher {
    pub fn new(
        matcher: TargetMatcher,
        output: OutputManager,
        coalescer: Option<Arc<NotificationCoalescer>>,
        stats: StatsCollector,
    ) -> Self {
        Self {
            matcher,
            output,
            coalescer,
            stats,
        }
    }

    pub fn output(&self) -> &OutputManager {
        &self.output
    }

    /// Drain the bus until cancelled or every publisher is gone
    pub async fn run(&self, mut consumer: BusConsumer, mut cancel: CancelSignal) {
        info!("Dispatcher running with {} targets", self.matcher.len());

        loop {
            if *cancel.borrow() {
                debug!("Dispatcher cancelled");
                break;
            }

            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() {
                        debug!("Cancellation sender dropped, dispatcher stopping");
                        break;
                    }
                }
                record = consumer.consume() => match record {
                    Some(record) => {
                        self.handle_record(&record).await;
                    }
                    None => {
                        info!("Event bus closed, dispatcher stopping");
                        break;
                    }
                }
            }
        }

        consumer.close();
    }

    /// Match one record; returns the number of match events produced
    pub async fn handle_record(&self, record: &CertRecord) -> usize {
        self.stats.increment_processed();
        let mut produced = 0;

        for domain in &record.domains {
            for target in self.matcher.matching_targets(domain) {
                let event = MatchEvent::new(domain.as_str(), target);
                self.stats.increment_matches();
                produced += 1;

                let result = MatchResult::from_match(&event, record);
                if let Err(e) = self.output.emit(&result).await {
                    warn!("Output error: {:?}", e);
                }

                if let Some(coalescer) = &self.coalescer {
                    coalescer.add(event);
                }
            }
        }

        produced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::event_bus;
    use crate::coalescer::CoalescerSettings;
    use crate::notify::{Notifiers, RetryPolicy};
    use crate::output::tests::CollectingOutput;
    use std::time::Duration;
    use tokio::sync::watch;

    fn record(domains: &[&str]) -> CertRecord {
        CertRecord {
            domains: domains.iter().map(|d| d.to_string()).collect(),
            not_before: 0,
            not_after: 0,
            issuer: "Test CA".to_string(),
            source_log: "https://ct.example.com/log".to_string(),
        }
    }

    fn build_dispatcher(
        targets: &[&str],
        scope: Option<&str>,
        coalescer: Option<Arc<NotificationCoalescer>>,
    ) -> (Dispatcher, Arc<CollectingOutput>, StatsCollector) {
        let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
        let collecting = Arc::new(CollectingOutput::default());
        let mut output = OutputManager::new();
        output.add_handler(collecting.clone());
        let stats = StatsCollector::new();
        (
            Dispatcher::new(TargetMatcher::new(&targets, scope), output, coalescer, stats.clone()),
            collecting,
            stats,
        )
    }

    #[tokio::test]
    async fn test_one_event_per_matching_target() {
        let (dispatcher, collecting, stats) = build_dispatcher(&["example", "example.com"], None, None);

        let produced = dispatcher
            .handle_record(&record(&["api.example.com", "unrelated.org"]))
            .await;

        assert_eq!(produced, 2);
        let results = collecting.results.lock().unwrap();
        assert_eq!(results[0].target, "example");
        assert_eq!(results[1].target, "example.com");
        assert!(results.iter().all(|r| r.domain == "api.example.com"));
        assert_eq!(stats.snapshot().matches, 2);
        assert_eq!(stats.snapshot().processed, 1);
    }

    #[tokio::test]
    async fn test_scope_filters_matches() {
        let (dispatcher, collecting, _) = build_dispatcher(&["example.com"], Some("api"), None);

        dispatcher
            .handle_record(&record(&["api.example.com", "mail.example.com"]))
            .await;

        let results = collecting.results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].domain, "api.example.com");
    }

    #[tokio::test(start_paused = true)]
    async fn test_matches_reach_coalescer() {
        let stats = StatsCollector::new();
        let notifiers = Arc::new(Notifiers::new(Vec::new(), RetryPolicy::default(), stats.clone()));
        let coalescer = NotificationCoalescer::new(
            CoalescerSettings {
                threshold: 25,
                flush_delay: Duration::from_secs(5),
            },
            notifiers,
            stats,
        );
        let (dispatcher, _, _) = build_dispatcher(&["example.com"], None, Some(coalescer.clone()));

        dispatcher
            .handle_record(&record(&["a.example.com", "b.example.com", "c.other.net"]))
            .await;

        assert_eq!(coalescer.pending_len("example.com"), 2);
    }

    #[tokio::test]
    async fn test_run_stops_when_bus_closes() {
        let (dispatcher, collecting, stats) = build_dispatcher(&["example.com"], None, None);
        let (publisher, consumer) = event_bus(8, stats.clone());
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        publisher.publish(record(&["www.example.com"]));
        publisher.publish(record(&["www.other.net"]));
        drop(publisher);

        tokio::time::timeout(Duration::from_secs(5), dispatcher.run(consumer, cancel_rx))
            .await
            .expect("dispatcher should stop once the bus closes");

        assert_eq!(collecting.results.lock().unwrap().len(), 1);
        assert_eq!(stats.snapshot().processed, 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let (dispatcher, _, stats) = build_dispatcher(&["example.com"], None, None);
        let (_publisher, consumer) = event_bus(8, stats);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { dispatcher.run(consumer, cancel_rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("dispatcher should stop on cancel")
            .unwrap();
    }
}
