// src/services/delivery.rs

//! Notification channels.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::models::{Channel, NotifierConfig, TelegramConfig};
use crate::utils::http::ensure_success;

/// Role of a message within a delivery batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Summary,
    Detail,
}

/// A message ready to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub kind: MessageKind,
    pub text: String,
    /// Posting this message covers; `None` for summaries
    pub fingerprint: Option<String>,
}

impl RenderedMessage {
    pub fn summary(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Summary,
            text: text.into(),
            fingerprint: None,
        }
    }

    pub fn detail(fingerprint: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Detail,
            text: text.into(),
            fingerprint: Some(fingerprint.into()),
        }
    }
}

/// Proof that the channel accepted a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfirmation {
    /// Channel-side message id, when the channel returns one
    pub message_id: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

/// A channel that accepts rendered messages.
///
/// Errors are `DeliveryFailed`; retrying is the caller's concern.
#[async_trait]
pub trait Deliverer: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, message: &RenderedMessage) -> Result<DeliveryConfirmation>;
}

/// Build the configured deliverer.
pub fn build_deliverer(config: &NotifierConfig, client: &Client) -> Result<Box<dyn Deliverer>> {
    match config.channel {
        Channel::Log => Ok(Box::new(LogDeliverer)),
        Channel::Telegram => Ok(Box::new(TelegramDeliverer::from_config(
            &config.telegram,
            client.clone(),
        )?)),
    }
}

/// Writes messages to the log. Always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDeliverer;

#[async_trait]
impl Deliverer for LogDeliverer {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, message: &RenderedMessage) -> Result<DeliveryConfirmation> {
        for line in message.text.lines() {
            log::info!("[notify] {}", line);
        }
        Ok(DeliveryConfirmation {
            message_id: None,
            delivered_at: Utc::now(),
        })
    }
}

/// Telegram Bot API `sendMessage`.
pub struct TelegramDeliverer {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramDeliverer {
    /// Read token and chat id from the configured environment variables.
    pub fn from_config(config: &TelegramConfig, client: Client) -> Result<Self> {
        let token = std::env::var(&config.bot_token_env)
            .map_err(|_| AppError::config(format!("${} is not set", config.bot_token_env)))?;
        let chat_id = std::env::var(&config.chat_id_env)
            .map_err(|_| AppError::config(format!("${} is not set", config.chat_id_env)))?;
        Self::new(client, &config.api_base, &token, &chat_id)
    }

    pub fn new(client: Client, api_base: &str, token: &str, chat_id: &str) -> Result<Self> {
        if token.trim().is_empty() || chat_id.trim().is_empty() {
            return Err(AppError::config("telegram token and chat id are required"));
        }
        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                api_base.trim_end_matches('/'),
                token.trim()
            ),
            chat_id: chat_id.trim().to_string(),
        })
    }
}

#[async_trait]
impl Deliverer for TelegramDeliverer {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, message: &RenderedMessage) -> Result<DeliveryConfirmation> {
        let payload = json!({
            "chat_id": self.chat_id,
            "text": message.text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::delivery(1, e))?;
        let response = ensure_success(response)
            .await
            .map_err(|e| AppError::delivery(1, e))?;
        let body: Value = response.json().await.map_err(|e| AppError::delivery(1, e))?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = body
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("telegram rejected the message");
            return Err(AppError::delivery(1, description));
        }

        let message_id = body
            .pointer("/result/message_id")
            .map(|id| id.to_string());
        Ok(DeliveryConfirmation {
            message_id,
            delivered_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_deliverer_confirms() {
        let confirmation = LogDeliverer
            .deliver(&RenderedMessage::summary("hello\nworld"))
            .await
            .unwrap();
        assert!(confirmation.message_id.is_none());
    }

    #[test]
    fn test_telegram_endpoint() {
        let deliverer =
            TelegramDeliverer::new(Client::new(), "https://api.telegram.org/", "123:abc", "42")
                .unwrap();
        assert_eq!(
            deliverer.endpoint,
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
        assert_eq!(deliverer.name(), "telegram");
    }

    #[test]
    fn test_telegram_requires_credentials() {
        assert!(TelegramDeliverer::new(Client::new(), "https://x", "", "42").is_err());
    }

    #[test]
    fn test_build_log_deliverer() {
        let deliverer = build_deliverer(&NotifierConfig::default(), &Client::new()).unwrap();
        assert_eq!(deliverer.name(), "log");
    }
}
