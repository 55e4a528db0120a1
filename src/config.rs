// src/config.rs

use anyhow::{Context, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::notify::RetryPolicy;

const TEMPLATE: &str = r#"# crtmon configuration
# monitor your targets in real time via certificate transparency logs

# target domains (or fragments) to watch
targets = []

[logging]
level = "info"

# discord webhook for notifications
[discord]
webhook_url = ""

# telegram bot credentials for notifications (optional)
[telegram]
bot_token = ""
chat_id = ""

# generic JSON webhook (optional)
# [webhook]
# url = "https://example.com/hook"
# secret = "shared-secret"
# timeout_secs = 5

# [ct_logs]
# poll_interval_secs = 10
# batch_size = 256

# [pipeline]
# flush_threshold = 25
# flush_delay_secs = 5
"#;

#[derive(Debug, Deserialize, Clone)]
pub struct CtLogConfig {
    #[serde(default = "default_log_list_url")]
    pub log_list_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Pause after a failed fetch before retrying the same index
    #[serde(default = "default_fetch_backoff")]
    pub fetch_backoff_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub additional_logs: Vec<String>, // Merged with the log list
    #[serde(default)]
    pub include_readonly_logs: bool,
}

fn default_log_list_url() -> String {
    "https://www.gstatic.com/ct/log_list/v3/all_logs_list.json".to_string()
}
fn default_batch_size() -> u64 { 256 }
fn default_poll_interval() -> u64 { 10 }
fn default_fetch_backoff() -> u64 { 5 }
fn default_request_timeout() -> u64 { 30 }

impl Default for CtLogConfig {
    fn default() -> Self {
        Self {
            log_list_url: default_log_list_url(),
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval(),
            fetch_backoff_secs: default_fetch_backoff(),
            request_timeout_secs: default_request_timeout(),
            additional_logs: Vec::new(),
            include_readonly_logs: false,
        }
    }
}

impl CtLogConfig {
    pub fn fetch_backoff(&self) -> Duration {
        Duration::from_secs(self.fetch_backoff_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
    /// Pending domains for one target that trigger an immediate flush
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    #[serde(default = "default_flush_delay")]
    pub flush_delay_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_rate_limit_wait")]
    pub rate_limit_wait_secs: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_bus_capacity() -> usize { crate::bus::DEFAULT_BUS_CAPACITY }
fn default_flush_threshold() -> usize { 25 }
fn default_flush_delay() -> u64 { 5 }
fn default_max_attempts() -> u32 { 3 }
fn default_rate_limit_wait() -> u64 { 2 }
fn default_shutdown_grace() -> u64 { 2 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bus_capacity: default_bus_capacity(),
            flush_threshold: default_flush_threshold(),
            flush_delay_secs: default_flush_delay(),
            max_attempts: default_max_attempts(),
            rate_limit_wait_secs: default_rate_limit_wait(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl PipelineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            rate_limit_wait: Duration::from_secs(self.rate_limit_wait_secs),
        }
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_secs(self.flush_delay_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl DiscordConfig {
    pub fn is_configured(&self) -> bool {
        is_set(&self.webhook_url)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        is_set(&self.bot_token) && is_set(&self.chat_id)
    }
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}
fn default_provider_timeout() -> u64 { 10 }

/// Treats whitespace and a literal `""` left over from hand editing as unset
fn is_set(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != r#""""#
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ct_logs: CtLogConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub discord: Option<DiscordConfig>,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub targets: Vec<String>,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `path` if it exists; a missing file is not an error
    pub fn load_optional(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::from_file(path).map(Some)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ct_logs.batch_size == 0 {
            bail!("ct_logs.batch_size must be at least 1");
        }
        if self.pipeline.bus_capacity == 0 {
            bail!("pipeline.bus_capacity must be at least 1");
        }
        if self.pipeline.flush_threshold == 0 {
            bail!("pipeline.flush_threshold must be at least 1");
        }
        if self.pipeline.max_attempts == 0 {
            bail!("pipeline.max_attempts must be at least 1");
        }
        if let Some(webhook) = &self.webhook {
            url::Url::parse(&webhook.url)
                .with_context(|| format!("invalid webhook url {:?}", webhook.url))?;
        }
        Ok(())
    }

    /// Configured targets, trimmed, without blanks
    pub fn targets(&self) -> Vec<String> {
        self.targets
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// `~/.config/crtmon/provider.toml`
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let home = std::env::var_os("HOME").context("HOME is not set; pass --config")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("crtmon")
        .join("provider.toml"))
}

/// Write the commented starter config, creating parent directories
pub fn write_template(path: &Path) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    fs::write(path, TEMPLATE)
        .with_context(|| format!("failed to write config template {}", path.display()))?;
    Ok(())
}
