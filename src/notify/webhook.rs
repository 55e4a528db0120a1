//! Generic JSON webhook provider with optional HMAC signature

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;

use super::{DeliveryOutcome, NotificationSender, encode_payload, post_json};
use crate::config::WebhookConfig;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the request body
pub const SIGNATURE_HEADER: &str = "X-Crtmon-Signature";

pub struct WebhookSender {
    client: Client,
    config: WebhookConfig,
}

#[derive(Serialize)]
pub struct WebhookPayload<'a> {
    pub target: &'a str,
    pub count: usize,
    pub domains: &'a [String],
    pub timestamp: i64,
}

/// Hex-encoded HMAC-SHA256 of `body`
pub fn sign(secret: &str, body: &[u8]) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("HMAC init error: {:?}", e))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

impl WebhookSender {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, target: &str, domains: &[String]) -> DeliveryOutcome {
        let payload = WebhookPayload {
            target,
            count: domains.len(),
            domains,
            timestamp: chrono::Utc::now().timestamp(),
        };

        let body = match encode_payload(&payload) {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };

        let timeout_secs = self.config.timeout_secs.unwrap_or(5);
        let mut request = self
            .client
            .post(&self.config.url)
            .timeout(Duration::from_secs(timeout_secs));

        if let Some(secret) = &self.config.secret {
            match sign(secret, &body) {
                Ok(signature) => request = request.header(SIGNATURE_HEADER, signature),
                Err(e) => return DeliveryOutcome::Encode(e.to_string()),
            }
        }

        post_json(request, body, &[200, 201, 202, 204]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer, secret: Option<&str>) -> WebhookConfig {
        WebhookConfig {
            url: format!("{}/hook", server.uri()),
            secret: secret.map(str::to_string),
            timeout_secs: Some(5),
        }
    }

    #[tokio::test]
    async fn test_webhook_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("Content-Type", "application/json"))
            .and(body_partial_json(serde_json::json!({
                "target": "example.com",
                "count": 1,
                "domains": ["api.example.com"]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = WebhookSender::new(config(&server, None))
            .deliver("example.com", &["api.example.com".to_string()])
            .await;
        assert_eq!(outcome, DeliveryOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_webhook_with_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists(SIGNATURE_HEADER))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = WebhookSender::new(config(&server, Some("test_secret")))
            .deliver("example.com", &["api.example.com".to_string()])
            .await;
        assert_eq!(outcome, DeliveryOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_webhook_timeout_is_network_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let mut cfg = config(&server, None);
        cfg.timeout_secs = Some(1);

        let outcome = WebhookSender::new(cfg)
            .deliver("example.com", &["api.example.com".to_string()])
            .await;
        assert!(matches!(outcome, DeliveryOutcome::Network(_)));
    }

    #[test]
    fn test_signature_is_hex_sha256() {
        let sig = sign("my_secret", b"{}").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(sig, sign("my_secret", b"{}").unwrap());
        assert_ne!(sig, sign("other", b"{}").unwrap());
    }
}
