//! Notification providers and the retry contract shared by all of them.
//!
//! A provider makes exactly one delivery attempt per `deliver` call and classifies
//! the result; `deliver_with_retry` owns the retry budget and rate-limit waits.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::stats::StatsCollector;

pub mod discord;
pub mod telegram;
pub mod webhook;

pub use discord::DiscordSender;
pub use telegram::TelegramSender;
pub use webhook::WebhookSender;

/// Result of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// HTTP 429; worth retrying after a pause
    RateLimited,
    /// Any other non-success status
    Rejected(u16),
    /// The request never produced a response
    Network(String),
    /// The payload could not be built; nothing was sent
    Encode(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// One notification provider
#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn name(&self) -> &'static str;

    /// Make a single attempt to deliver `domains` found for `target`
    async fn deliver(&self, target: &str, domains: &[String]) -> DeliveryOutcome;
}

/// Retry budget applied to every provider send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Multiplied by the attempt number after each rate-limited response
    pub rate_limit_wait: Duration,
}

impl RetryPolicy {
    pub fn wait_after(&self, attempt: u32) -> Duration {
        self.rate_limit_wait * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_wait: Duration::from_secs(2),
        }
    }
}

/// Deliver with the retry contract: only rate limiting is retried, everything else is final.
/// Returns the last outcome observed.
pub async fn deliver_with_retry(
    sender: &dyn NotificationSender,
    target: &str,
    domains: &[String],
    policy: RetryPolicy,
) -> DeliveryOutcome {
    let mut outcome = DeliveryOutcome::RateLimited;

    for attempt in 1..=policy.max_attempts.max(1) {
        outcome = sender.deliver(target, domains).await;

        match &outcome {
            DeliveryOutcome::Delivered => {
                debug!(
                    "{}: delivered {} domains for {} (attempt {})",
                    sender.name(),
                    domains.len(),
                    target,
                    attempt
                );
                return outcome;
            }
            DeliveryOutcome::RateLimited => {
                if attempt < policy.max_attempts {
                    let wait = policy.wait_after(attempt);
                    warn!(
                        "{}: rate limited, waiting {:?} (attempt {}/{})",
                        sender.name(),
                        wait,
                        attempt,
                        policy.max_attempts
                    );
                    tokio::time::sleep(wait).await;
                }
            }
            DeliveryOutcome::Rejected(status) => {
                warn!("{}: send error, status {} for {}", sender.name(), status, target);
                return outcome;
            }
            DeliveryOutcome::Network(e) => {
                error!("{}: failed to send notification for {}: {}", sender.name(), target, e);
                return outcome;
            }
            DeliveryOutcome::Encode(e) => {
                error!("{}: failed to encode notification for {}: {}", sender.name(), target, e);
                return outcome;
            }
        }
    }

    error!(
        "{}: failed to send after {} attempts for {}",
        sender.name(),
        policy.max_attempts,
        target
    );
    outcome
}

/// Map an HTTP status to an outcome given the provider's success codes
pub(crate) fn classify_status(status: reqwest::StatusCode, success: &[u16]) -> DeliveryOutcome {
    if success.contains(&status.as_u16()) {
        DeliveryOutcome::Delivered
    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        DeliveryOutcome::RateLimited
    } else {
        DeliveryOutcome::Rejected(status.as_u16())
    }
}

/// Serialise a provider payload; a failure becomes `DeliveryOutcome::Encode`
pub(crate) fn encode_payload<T: serde::Serialize>(payload: &T) -> Result<Vec<u8>, DeliveryOutcome> {
    serde_json::to_vec(payload).map_err(|e| DeliveryOutcome::Encode(e.to_string()))
}

/// POST a prepared JSON body and classify the response
pub(crate) async fn post_json(
    request: reqwest::RequestBuilder,
    body: Vec<u8>,
    success: &[u16],
) -> DeliveryOutcome {
    let response = request
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await;

    match response {
        Ok(resp) => classify_status(resp.status(), success),
        Err(e) => DeliveryOutcome::Network(e.to_string()),
    }
}

/// Provider names accepted by `--notify`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Discord,
    Telegram,
    Webhook,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Discord => "discord",
            Provider::Telegram => "telegram",
            Provider::Webhook => "webhook",
        })
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "discord" => Ok(Provider::Discord),
            "telegram" => Ok(Provider::Telegram),
            "webhook" => Ok(Provider::Webhook),
            other => anyhow::bail!(
                "invalid notification provider {:?}. valid options are: discord, telegram, webhook, both",
                other
            ),
        }
    }
}

/// Parse a `--notify` value: a comma-separated provider list, where `both` means discord + telegram
pub fn parse_providers(value: &str) -> anyhow::Result<Vec<Provider>> {
    let mut providers = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let expanded = if part.eq_ignore_ascii_case("both") {
            vec![Provider::Discord, Provider::Telegram]
        } else {
            vec![part.parse()?]
        };
        for provider in expanded {
            if !providers.contains(&provider) {
                providers.push(provider);
            }
        }
    }
    Ok(providers)
}

/// The providers enabled for this run and the retry policy applied to each
pub struct Notifiers {
    senders: Vec<Arc<dyn NotificationSender>>,
    policy: RetryPolicy,
    stats: StatsCollector,
}

impl Notifiers {
    pub fn new(
        senders: Vec<Arc<dyn NotificationSender>>,
        policy: RetryPolicy,
        stats: StatsCollector,
    ) -> Self {
        Self {
            senders,
            policy,
            stats,
        }
    }

    /// Build the selected providers. A provider without credentials is skipped with a warning.
    pub fn from_config(config: &Config, selected: &[Provider], stats: StatsCollector) -> Self {
        let mut senders: Vec<Arc<dyn NotificationSender>> = Vec::new();

        for provider in selected {
            let sender: Option<Arc<dyn NotificationSender>> = match provider {
                Provider::Discord => config
                    .discord
                    .as_ref()
                    .filter(|d| d.is_configured())
                    .map(|d| Arc::new(DiscordSender::new(d.clone())) as Arc<dyn NotificationSender>),
                Provider::Telegram => config
                    .telegram
                    .as_ref()
                    .filter(|t| t.is_configured())
                    .map(|t| Arc::new(TelegramSender::new(t.clone())) as Arc<dyn NotificationSender>),
                Provider::Webhook => config
                    .webhook
                    .as_ref()
                    .filter(|w| !w.url.trim().is_empty())
                    .map(|w| Arc::new(WebhookSender::new(w.clone())) as Arc<dyn NotificationSender>),
            };

            match sender {
                Some(sender) => senders.push(sender),
                None => warn!(
                    "notify={} selected but {} is not configured; {} notifications disabled",
                    provider, provider, provider
                ),
            }
        }

        Self::new(senders, config.pipeline.retry_policy(), stats)
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.senders.iter().map(|s| s.name()).collect()
    }

    /// Send one batch through every provider in turn
    pub async fn deliver_batch(&self, target: &str, domains: &[String]) {
        for sender in &self.senders {
            let outcome = deliver_with_retry(sender.as_ref(), target, domains, self.policy).await;
            if outcome.is_delivered() {
                self.stats.increment_delivered();
            } else {
                self.stats.increment_delivery_failures();
            }
        }
    }
}
