// src/engine.rs
//! Wires the pipeline: log monitors -> event bus -> dispatcher -> coalescer -> providers.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::bus::event_bus;
use crate::cert_parser::CertDecoder;
use crate::coalescer::{CoalescerSettings, NotificationCoalescer};
use crate::config::Config;
use crate::ct_log::source::{CancelSignal, LogSource, sleep_or_cancelled};
use crate::ct_log::CtLogCoordinator;
use crate::dispatcher::Dispatcher;
use crate::matcher::TargetMatcher;
use crate::notify::Notifiers;
use crate::output::OutputManager;
use crate::stats::StatsCollector;

/// Tunables for one run
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub bus_capacity: usize,
    pub fetch_backoff: Duration,
    pub coalescer: CoalescerSettings,
    pub shutdown_grace: Duration,
    /// Interval of the statistics log line; `None` disables it
    pub stats_interval: Option<Duration>,
    pub health_interval: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bus_capacity: config.pipeline.bus_capacity,
            fetch_backoff: config.ct_logs.fetch_backoff(),
            coalescer: CoalescerSettings {
                threshold: config.pipeline.flush_threshold,
                flush_delay: config.pipeline.flush_delay(),
            },
            shutdown_grace: config.pipeline.shutdown_grace(),
            stats_interval: None,
            health_interval: Duration::from_secs(300),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct Engine {
    source: Arc<dyn LogSource>,
    decoder: Arc<dyn CertDecoder>,
    matcher: TargetMatcher,
    output: OutputManager,
    notifiers: Arc<Notifiers>,
    settings: EngineSettings,
    stats: StatsCollector,
}

impl Engine {
    pub fn new(
        source: Arc<dyn LogSource>,
        decoder: Arc<dyn CertDecoder>,
        matcher: TargetMatcher,
        output: OutputManager,
        notifiers: Notifiers,
        settings: EngineSettings,
        stats: StatsCollector,
    ) -> Self {
        Self {
            source,
            decoder,
            matcher,
            output,
            notifiers: Arc::new(notifiers),
            settings,
            stats,
        }
    }

    /// Run until cancelled, even when every log monitor has stopped. Fails only at
    /// startup, when the log roster is unavailable.
    pub async fn run(self, cancel: CancelSignal) -> Result<()> {
        let (publisher, consumer) = event_bus(self.settings.bus_capacity, self.stats.clone());

        let coordinator =
            CtLogCoordinator::new(Arc::clone(&self.source), Arc::clone(&self.decoder), self.settings.fetch_backoff)
                .with_health_interval(self.settings.health_interval);
        let health = coordinator.health_tracker();
        let monitors = coordinator.start(publisher, cancel.clone()).await?;

        let coalescer = NotificationCoalescer::new(
            self.settings.coalescer,
            Arc::clone(&self.notifiers),
            self.stats.clone(),
        );

        if self.notifiers.is_empty() {
            info!("Notifications off");
        } else {
            info!("Notifications: {}", self.notifiers.names().join(", "));
        }

        let stats_task = self.settings.stats_interval.map(|interval| {
            let stats = self.stats.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                while !sleep_or_cancelled(interval, &cancel).await {
                    info!("{}", stats.format_stats());
                }
            })
        });

        let dispatcher = Dispatcher::new(
            self.matcher,
            self.output,
            Some(Arc::clone(&coalescer)),
            self.stats.clone(),
        );
        dispatcher.run(consumer, cancel.clone()).await;

        if !*cancel.borrow() {
            warn!("All log monitors stopped; idle until shutdown is requested");
            wait_for_cancel(cancel.clone()).await;
        }

        monitors.join().await;
        if let Some(task) = stats_task {
            task.abort();
        }

        coalescer.flush_all();
        coalescer.drain(self.settings.shutdown_grace).await;

        if let Err(e) = dispatcher.output().flush().await {
            warn!("Failed to flush output: {}", e);
        }

        health.log_summary();
        info!("Final statistics: {}", self.stats.format_stats());
        Ok(())
    }
}

/// Resolves once cancellation is requested or the sender is gone
async fn wait_for_cancel(mut cancel: CancelSignal) {
    while !*cancel.borrow_and_update() {
        if cancel.changed().await.is_err() {
            break;
        }
    }
}
