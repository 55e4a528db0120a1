//! Discord webhook provider

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

use super::{DeliveryOutcome, NotificationSender, encode_payload, post_json};
use crate::config::DiscordConfig;

/// Embed side-bar colour
const EMBED_COLOR: u32 = 2829617;

pub struct DiscordSender {
    client: Client,
    config: DiscordConfig,
}

impl DiscordSender {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// One embed per batch: target and count in the title, domains in a code block
    pub fn build_payload(target: &str, domains: &[String]) -> Value {
        json!({
            "tts": false,
            "embeds": [{
                "title": format!("{}  [{}]", target, domains.len()),
                "description": format!("```\n{}\n```", domains.join("\n")),
                "color": EMBED_COLOR,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }]
        })
    }
}

#[async_trait]
impl NotificationSender for DiscordSender {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn deliver(&self, target: &str, domains: &[String]) -> DeliveryOutcome {
        let body = match encode_payload(&Self::build_payload(target, domains)) {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };

        let request = self
            .client
            .post(&self.config.webhook_url)
            .timeout(Duration::from_secs(self.config.timeout_secs));

        post_json(request, body, &[200, 204]).await
    }
}
