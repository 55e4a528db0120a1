// src/ct_log/health.rs
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Health status of a CT log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogHealth {
    /// Last fetch succeeded
    Healthy,
    /// One or more consecutive fetch failures; still being retried
    Degraded,
    /// Monitor gave up at startup and no longer polls this log
    Disabled,
}

/// Health information for a single log
#[derive(Debug, Clone)]
pub struct LogHealthInfo {
    pub status: LogHealth,
    /// Number of consecutive failures
    pub failure_count: u32,
    pub last_success: Option<Instant>,
    pub last_error: Option<String>,
}

impl LogHealthInfo {
    fn new() -> Self {
        Self {
            status: LogHealth::Healthy,
            failure_count: 0,
            last_success: None,
            last_error: None,
        }
    }
}

/// Counts of logs per health status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthCounts {
    pub healthy: usize,
    pub degraded: usize,
    pub disabled: usize,
}

/// Tracks health status of all monitored CT logs
///
/// Updated synchronously from the monitor loops; the lock is never held across an await.
#[derive(Default)]
pub struct LogHealthTracker {
    health: Mutex<HashMap<String, LogHealthInfo>>,
}

impl LogHealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<R>(&self, log_url: &str, f: impl FnOnce(&mut LogHealthInfo) -> R) -> R {
        let mut health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        let info = health
            .entry(log_url.to_string())
            .or_insert_with(LogHealthInfo::new);
        f(info)
    }

    /// Record a successful fetch from a log
    pub fn record_success(&self, log_url: &str) {
        self.with_entry(log_url, |info| {
            if info.status == LogHealth::Degraded {
                info!(
                    "Log recovered: {} is healthy again after {} failures",
                    log_url, info.failure_count
                );
            }
            info.status = LogHealth::Healthy;
            info.failure_count = 0;
            info.last_success = Some(Instant::now());
        });
    }

    /// Record a failed fetch; returns the consecutive failure count
    pub fn record_failure(&self, log_url: &str, error: String) -> u32 {
        self.with_entry(log_url, |info| {
            info.failure_count += 1;
            info.last_error = Some(error);

            if info.status == LogHealth::Healthy {
                warn!("Log degraded: {}", log_url);
            } else {
                debug!("Log {} still failing ({} in a row)", log_url, info.failure_count);
            }
            info.status = LogHealth::Degraded;
            info.failure_count
        })
    }

    /// Mark a log as permanently abandoned for this run
    pub fn record_disabled(&self, log_url: &str, error: String) {
        self.with_entry(log_url, |info| {
            info.status = LogHealth::Disabled;
            info.last_error = Some(error);
        });
    }

    /// Get current health status for a log
    pub fn get_status(&self, log_url: &str) -> LogHealth {
        let health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        health
            .get(log_url)
            .map(|info| info.status)
            .unwrap_or(LogHealth::Healthy)
    }

    /// Every tracked log with its health, ordered by URL
    pub fn snapshot(&self) -> Vec<(String, LogHealthInfo)> {
        let health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        let mut logs: Vec<_> = health
            .iter()
            .map(|(url, info)| (url.clone(), info.clone()))
            .collect();
        logs.sort_by(|a, b| a.0.cmp(&b.0));
        logs
    }

    pub fn counts(&self) -> HealthCounts {
        let health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        let mut counts = HealthCounts::default();
        for info in health.values() {
            match info.status {
                LogHealth::Healthy => counts.healthy += 1,
                LogHealth::Degraded => counts.degraded += 1,
                LogHealth::Disabled => counts.disabled += 1,
            }
        }
        counts
    }

    /// Log a summary of all log health statuses
    pub fn log_summary(&self) {
        let counts = self.counts();
        let total = counts.healthy + counts.degraded + counts.disabled;
        if total == 0 {
            return;
        }

        info!(
            "Log health summary: {} total ({} healthy, {} degraded, {} disabled)",
            total, counts.healthy, counts.degraded, counts.disabled
        );

        for (url, info) in self.snapshot() {
            let error = info.last_error.as_deref().unwrap_or("unknown error");
            match info.status {
                LogHealth::Healthy => {}
                LogHealth::Degraded => {
                    let since = info
                        .last_success
                        .map(|t| format!("{}s ago", t.elapsed().as_secs()))
                        .unwrap_or_else(|| "never".to_string());
                    warn!(
                        "Degraded log: {} - {} consecutive failures, last success {}, last error: {}",
                        url, info.failure_count, since, error
                    );
                }
                LogHealth::Disabled => warn!("Disabled log: {} - {}", url, error),
            }
        }
    }
}
