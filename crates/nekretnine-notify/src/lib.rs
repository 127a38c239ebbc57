//! Delivery of listing notifications to a chat bot.

use std::fmt;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(reqwest::Error),
    #[error("telegram rejected message (http {status}): {description}")]
    Rejected { status: u16, description: String },
    #[error("unreadable telegram response (http {status}): {message}")]
    Response { status: u16, message: String },
}

impl From<reqwest::Error> for NotifyError {
    // The request URL embeds the bot token.
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Request(err.without_url())
    }
}

/// Capability to deliver one plain-text message to the configured recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

#[derive(Clone)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: String,
    pub chat_id: String,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_base", &self.api_base)
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building telegram client")?;
        Ok(Self { client, config })
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(self.send_message_url())
            .json(&SendMessageRequest {
                chat_id: &self.config.chat_id,
                text,
            })
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        interpret_response(status, &body)?;
        debug!(chat_id = %self.config.chat_id, "telegram message delivered");
        Ok(())
    }
}

fn interpret_response(status: u16, body: &str) -> Result<(), NotifyError> {
    let parsed: TelegramResponse =
        serde_json::from_str(body).map_err(|e| NotifyError::Response {
            status,
            message: e.to_string(),
        })?;
    if parsed.ok && (200..300).contains(&status) {
        return Ok(());
    }
    Err(NotifyError::Rejected {
        status,
        description: parsed
            .description
            .unwrap_or_else(|| "no description".to_string()),
    })
}
