// src/coalescer.rs
//! Per-target batching of match events into rate-friendly notifications.
//!
//! Each target is either idle (no entry in the table) or accumulating. The first event
//! for an idle target starts a flush timer; reaching the size threshold flushes at once
//! and aborts that timer. Every batch carries a sequence number, and a timer only
//! flushes the batch it was started for.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::notify::Notifiers;
use crate::stats::StatsCollector;
use crate::types::MatchEvent;

#[derive(Debug, Clone, Copy)]
pub struct CoalescerSettings {
    /// Pending domains that trigger an immediate flush
    pub threshold: usize,
    pub flush_delay: Duration,
}

impl Default for CoalescerSettings {
    fn default() -> Self {
        Self {
            threshold: 25,
            flush_delay: Duration::from_secs(5),
        }
    }
}

struct PendingBatch {
    seq: u64,
    domains: Vec<String>,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct State {
    pending: HashMap<String, PendingBatch>,
    next_seq: u64,
}

pub struct NotificationCoalescer {
    state: Mutex<State>,
    settings: CoalescerSettings,
    notifiers: Arc<Notifiers>,
    stats: StatsCollector,
    deliveries: Mutex<Vec<JoinHandle<()>>>,
}

impl NotificationCoalescer {
    pub fn new(
        settings: CoalescerSettings,
        notifiers: Arc<Notifiers>,
        stats: StatsCollector,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            settings: CoalescerSettings {
                threshold: settings.threshold.max(1),
                ..settings
            },
            notifiers,
            stats,
            deliveries: Mutex::new(Vec::new()),
        })
    }

    /// Record one match. Never awaits; a full batch is handed to a delivery task.
    pub fn add(self: &Arc<Self>, event: MatchEvent) {
        let MatchEvent { domain, target } = event;

        let ready = {
            let mut state = self.lock_state();
            let State { pending, next_seq } = &mut *state;

            let batch = match pending.entry(target.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    *next_seq += 1;
                    let seq = *next_seq;
                    debug!("coalescer: new batch #{} for {}", seq, target);
                    entry.insert(PendingBatch {
                        seq,
                        domains: Vec::new(),
                        timer: Some(self.spawn_timer(target.clone(), seq)),
                    })
                }
            };

            batch.domains.push(domain);

            if batch.domains.len() >= self.settings.threshold {
                pending.remove(&target).map(|mut batch| {
                    if let Some(timer) = batch.timer.take() {
                        timer.abort();
                    }
                    batch.domains
                })
            } else {
                None
            }
        };

        if let Some(domains) = ready {
            debug!("coalescer: size flush for {} ({} domains)", target, domains.len());
            self.dispatch(target, domains);
        }
    }

    fn spawn_timer(self: &Arc<Self>, target: String, seq: u64) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let delay = self.settings.flush_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(coalescer) = weak.upgrade() {
                coalescer.on_timer(&target, seq);
            }
        })
    }

    fn on_timer(self: &Arc<Self>, target: &str, seq: u64) {
        let ready = {
            let mut state = self.lock_state();
            // Batch already flushed by size; a newer one (if any) has its own timer
            if state.pending.get(target).map(|b| b.seq) == Some(seq) {
                state.pending.remove(target).map(|batch| batch.domains)
            } else {
                None
            }
        };

        if let Some(domains) = ready {
            debug!("coalescer: timer flush for {} ({} domains)", target, domains.len());
            self.dispatch(target.to_string(), domains);
        }
    }

    /// Flush every pending batch now, regardless of size or timer
    pub fn flush_all(self: &Arc<Self>) {
        let drained: Vec<(String, Vec<String>)> = {
            let mut state = self.lock_state();
            state
                .pending
                .drain()
                .map(|(target, mut batch)| {
                    if let Some(timer) = batch.timer.take() {
                        timer.abort();
                    }
                    (target, batch.domains)
                })
                .collect()
        };

        for (target, domains) in drained {
            self.dispatch(target, domains);
        }
    }

    fn dispatch(&self, target: String, domains: Vec<String>) {
        self.stats.increment_flushes();

        if self.notifiers.is_empty() {
            return;
        }

        let notifiers = Arc::clone(&self.notifiers);
        let handle = tokio::spawn(async move {
            notifiers.deliver_batch(&target, &domains).await;
        });

        let mut deliveries = self
            .deliveries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        deliveries.retain(|h| !h.is_finished());
        deliveries.push(handle);
    }

    /// Number of targets currently accumulating
    pub fn pending_targets(&self) -> usize {
        self.lock_state().pending.len()
    }

    pub fn pending_len(&self, target: &str) -> usize {
        self.lock_state()
            .pending
            .get(target)
            .map(|b| b.domains.len())
            .unwrap_or(0)
    }

    /// Wait for in-flight deliveries, giving up after `grace`
    pub async fn drain(&self, grace: Duration) {
        let handles: Vec<JoinHandle<()>> = {
            let mut deliveries = self
                .deliveries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            deliveries.drain(..).collect()
        };

        if handles.is_empty() {
            return;
        }

        info!("Waiting up to {:?} for {} notification deliveries", grace, handles.len());
        let wait_all = futures_util::future::join_all(handles);
        if tokio::time::timeout(grace, wait_all).await.is_err() {
            warn!("Shutdown grace period elapsed; abandoning in-flight deliveries");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
