//! Telegram Bot API provider

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{DeliveryOutcome, NotificationSender, encode_payload, post_json};
use crate::config::TelegramConfig;

pub struct TelegramSender {
    client: Client,
    config: TelegramConfig,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

impl TelegramSender {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn build_message(target: &str, domains: &[String]) -> String {
        format!("*{}* [{}]\n```{}```", target, domains.len(), domains.join("\n"))
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }
}

#[async_trait]
impl NotificationSender for TelegramSender {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn deliver(&self, target: &str, domains: &[String]) -> DeliveryOutcome {
        let payload = SendMessage {
            chat_id: &self.config.chat_id,
            text: Self::build_message(target, domains),
            parse_mode: "Markdown",
            disable_web_page_preview: true,
        };

        let body = match encode_payload(&payload) {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };

        let request = self
            .client
            .post(self.endpoint())
            .timeout(Duration::from_secs(self.config.timeout_secs));

        post_json(request, body, &[200]).await
    }
}
