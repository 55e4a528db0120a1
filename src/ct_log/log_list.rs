// src/ct_log/log_list.rs
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{LogDescriptor, LogListV3};

/// Fetches and filters Google's CT log list
pub struct LogListFetcher {
    http_client: reqwest::Client,
}

impl LogListFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http_client })
    }

    /// Fetch the logs currently accepting certificates
    ///
    /// # Arguments
    /// * `list_url` - URL to Google's CT log list (usually v3/all_logs_list.json)
    /// * `include_readonly` - Whether to include readonly logs (frozen but may have recent entries)
    pub async fn fetch_usable_logs(
        &self,
        list_url: &str,
        include_readonly: bool,
    ) -> Result<Vec<LogDescriptor>> {
        info!("Fetching CT log list from {}", list_url);

        let response = self
            .http_client
            .get(list_url)
            .send()
            .await
            .context("Failed to fetch CT log list")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch log list: HTTP {}", response.status());
        }

        let log_list: LogListV3 = response
            .json()
            .await
            .context("Failed to parse log list JSON")?;

        Ok(select_logs(&log_list, include_readonly))
    }

    /// Fetch the log list and append extra log URLs that are not already present
    pub async fn fetch_logs_with_additional(
        &self,
        list_url: &str,
        include_readonly: bool,
        additional_logs: &[String],
    ) -> Result<Vec<LogDescriptor>> {
        let mut logs = self.fetch_usable_logs(list_url, include_readonly).await?;
        let from_list = logs.len();

        for raw in additional_logs {
            match normalize_log_url(raw) {
                Ok(url) if !logs.iter().any(|l| l.url == url) => {
                    info!("Adding additional log: {}", url);
                    logs.push(LogDescriptor::new(url, ""));
                }
                Ok(_) => {}
                Err(e) => warn!("Ignoring additional log {:?}: {}", raw, e),
            }
        }

        info!(
            "Total logs: {} ({} from list + {} additional)",
            logs.len(),
            from_list,
            logs.len() - from_list
        );

        Ok(logs)
    }
}

/// Pick acceptable logs out of a parsed log list
pub fn select_logs(log_list: &LogListV3, include_readonly: bool) -> Vec<LogDescriptor> {
    let mut acceptable_logs: Vec<LogDescriptor> = Vec::new();

    for operator in &log_list.operators {
        for log in &operator.logs {
            let acceptable = log
                .state
                .as_ref()
                .map(|s| s.is_acceptable(include_readonly))
                .unwrap_or(false);

            if !acceptable || log.url.is_empty() {
                continue;
            }

            match normalize_log_url(&log.url) {
                Ok(url) => {
                    debug!("Found log: {} ({}) from {}", log.description, url, operator.name);
                    if !acceptable_logs.iter().any(|l| l.url == url) {
                        acceptable_logs.push(LogDescriptor::new(url, log.description.clone()));
                    }
                }
                Err(e) => warn!("Skipping log {:?} with bad URL: {}", log.description, e),
            }
        }
    }

    info!(
        "Found {} acceptable CT logs (readonly={})",
        acceptable_logs.len(),
        include_readonly
    );

    acceptable_logs
}

/// Ensure an https scheme and strip any trailing slash
pub fn normalize_log_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let parsed = url::Url::parse(&with_scheme).with_context(|| format!("Invalid log URL: {}", raw))?;
    if parsed.host_str().is_none() {
        anyhow::bail!("Log URL has no host: {}", raw);
    }

    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_list() -> serde_json::Value {
        serde_json::json!({
            "operators": [
                {
                    "name": "Google",
                    "logs": [
                        {"description": "Argon", "url": "ct.googleapis.com/logs/argon/", "state": {"usable": {"timestamp": "t"}}},
                        {"description": "Old", "url": "https://ct.googleapis.com/logs/old/", "state": {"retired": {"timestamp": "t"}}}
                    ]
                },
                {
                    "name": "Other",
                    "logs": [
                        {"description": "Frozen", "url": "https://frozen.example/", "state": {"readonly": {"timestamp": "t"}}},
                        {"description": "No state", "url": "https://nostate.example/"}
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_normalize_log_url() {
        assert_eq!(
            normalize_log_url("ct.googleapis.com/logs/argon2025h1/").unwrap(),
            "https://ct.googleapis.com/logs/argon2025h1"
        );
        assert_eq!(
            normalize_log_url("https://oak.ct.letsencrypt.org/2025h1").unwrap(),
            "https://oak.ct.letsencrypt.org/2025h1"
        );
        assert_eq!(
            normalize_log_url("http://127.0.0.1:8080/").unwrap(),
            "http://127.0.0.1:8080"
        );
        assert!(normalize_log_url("https://").is_err());
    }

    #[test]
    fn test_select_logs() {
        let list: LogListV3 = serde_json::from_value(sample_list()).unwrap();

        let logs = select_logs(&list, false);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].url, "https://ct.googleapis.com/logs/argon");
        assert_eq!(logs[0].name, "Argon");

        let logs = select_logs(&list, true);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].url, "https://frozen.example");
    }

    #[tokio::test]
    async fn test_fetch_logs_with_additional() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/all_logs_list.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_list()))
            .mount(&server)
            .await;

        let fetcher = LogListFetcher::new(Duration::from_secs(5)).unwrap();
        let logs = fetcher
            .fetch_logs_with_additional(
                &format!("{}/all_logs_list.json", server.uri()),
                false,
                &[
                    "https://ct.googleapis.com/logs/argon/".to_string(),
                    "extra.example/log".to_string(),
                ],
            )
            .await
            .unwrap();

        let urls: Vec<&str> = logs.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://ct.googleapis.com/logs/argon", "https://extra.example/log"]
        );
    }

    #[tokio::test]
    async fn test_fetch_log_list_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = LogListFetcher::new(Duration::from_secs(5)).unwrap();
        assert!(fetcher.fetch_usable_logs(&server.uri(), false).await.is_err());
    }
}
