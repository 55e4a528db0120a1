// src/ct_log/source.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use super::client::CtLogClient;
use super::log_list::LogListFetcher;
use super::types::{FetchedBatch, LogDescriptor};
use crate::config::CtLogConfig;

/// Process-wide shutdown flag; `true` means stop
pub type CancelSignal = watch::Receiver<bool>;

/// Sleep for `duration` unless cancellation arrives first. Returns true when cancelled.
pub async fn sleep_or_cancelled(duration: Duration, cancel: &CancelSignal) -> bool {
    if *cancel.borrow() {
        return true;
    }

    let mut cancel = cancel.clone();
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = cancel.changed() => {
            // Sender gone counts as shutdown
            changed.is_err() || *cancel.borrow()
        }
    }
}

/// Supplies the roster of logs and sequential access to their entries
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Logs to monitor; failure here aborts startup
    async fn list_active(&self) -> Result<Vec<LogDescriptor>>;

    /// Current tree size of the log, used as the starting index
    async fn head(&self, log: &LogDescriptor) -> Result<u64>;

    /// Next batch starting at `from_index`. An empty batch means the caller is caught up.
    async fn fetch_batch(
        &self,
        log: &LogDescriptor,
        from_index: u64,
        cancel: &CancelSignal,
    ) -> Result<FetchedBatch>;
}

/// `LogSource` backed by the public log list and the RFC 6962 HTTP API
pub struct HttpLogSource {
    config: CtLogConfig,
    http_client: reqwest::Client,
    known_tree_sizes: Mutex<HashMap<String, u64>>,
}

impl HttpLogSource {
    pub fn new(config: CtLogConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            config,
            http_client,
            known_tree_sizes: Mutex::new(HashMap::new()),
        })
    }

    fn client(&self, log: &LogDescriptor) -> CtLogClient {
        CtLogClient::with_client(log.url.clone(), self.http_client.clone())
    }

    fn known_tree_size(&self, log: &LogDescriptor) -> u64 {
        let sizes = self.known_tree_sizes.lock().unwrap_or_else(|e| e.into_inner());
        sizes.get(&log.url).copied().unwrap_or(0)
    }

    fn set_known_tree_size(&self, log: &LogDescriptor, size: u64) {
        let mut sizes = self.known_tree_sizes.lock().unwrap_or_else(|e| e.into_inner());
        sizes.insert(log.url.clone(), size);
    }
}

#[async_trait]
impl LogSource for HttpLogSource {
    async fn list_active(&self) -> Result<Vec<LogDescriptor>> {
        let fetcher = LogListFetcher::new(Duration::from_secs(self.config.request_timeout_secs))?;
        fetcher
            .fetch_logs_with_additional(
                &self.config.log_list_url,
                self.config.include_readonly_logs,
                &self.config.additional_logs,
            )
            .await
    }

    async fn head(&self, log: &LogDescriptor) -> Result<u64> {
        let sth = self.client(log).get_sth().await?;
        self.set_known_tree_size(log, sth.tree_size);
        Ok(sth.tree_size)
    }

    async fn fetch_batch(
        &self,
        log: &LogDescriptor,
        from_index: u64,
        cancel: &CancelSignal,
    ) -> Result<FetchedBatch> {
        let client = self.client(log);

        // Only ask for a fresh tree head once the cached one has been consumed
        let mut tree_size = self.known_tree_size(log);
        if from_index >= tree_size {
            tree_size = client.get_sth().await.context("Failed to get STH")?.tree_size;
            self.set_known_tree_size(log, tree_size);
        }

        if from_index >= tree_size {
            debug!("{}: up to date at index {}", log.url, from_index);
            sleep_or_cancelled(Duration::from_secs(self.config.poll_interval_secs), cancel).await;
            return Ok(FetchedBatch {
                entries: Vec::new(),
                next_index: from_index,
            });
        }

        let end_index = std::cmp::min(from_index + self.config.batch_size, tree_size) - 1;
        let entries = client
            .get_entries(from_index, end_index)
            .await
            .context("Failed to get entries")?;

        if entries.is_empty() {
            anyhow::bail!(
                "Log returned no entries for range {}-{}",
                from_index,
                end_index
            );
        }

        let next_index = from_index + entries.len() as u64;
        Ok(FetchedBatch {
            entries,
            next_index,
        })
    }
}
