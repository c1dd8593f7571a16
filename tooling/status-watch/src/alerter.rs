use crate::models::Incident;
use reqwest::{Client, StatusCode};
use std::{future::Future, time::Duration};
use teloxide::{
    Bot,
    requests::{Request, Requester},
    types::ChatId,
};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned non-success status: {0}")]
    WebhookStatus(StatusCode),
}

/// Confirmed incidents rendered for a human, one per line, followed by a
/// link to the public status page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub incidents: Vec<Incident>,
    pub page_url: String,
}

impl AlertMessage {
    pub fn new(incidents: Vec<Incident>, page_url: impl Into<String>) -> Self {
        Self {
            incidents,
            page_url: page_url.into(),
        }
    }

    pub fn render(&self) -> String {
        let mut lines: Vec<String> = self
            .incidents
            .iter()
            .map(|incident| {
                format!(
                    "{} — {} ({})",
                    incident.name, incident.status, incident.impact
                )
            })
            .collect();
        lines.push(self.page_url.clone());
        lines.join("\n")
    }
}

#[async_trait::async_trait]
pub trait Notifier {
    async fn send_alert(&self, message: &AlertMessage) -> Result<(), AlertError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u8,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}

async fn send_with_retries<F, Fut>(
    policy: RetryPolicy,
    channel: &'static str,
    mut send: F,
) -> Result<(), AlertError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), AlertError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt: u8 = 1;

    loop {
        match send().await {
            Ok(()) => return Ok(()),
            Err(error) if attempt >= max_attempts => return Err(error),
            Err(error) => {
                warn!(
                    channel,
                    attempt,
                    max_attempts,
                    retry_in = ?delay,
                    error = %error,
                    "alert delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

/// Posts `{"text": ...}` to a chat webhook (Slack and compatible).
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    retry: RetryPolicy,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration, retry: RetryPolicy) -> Result<Self, AlertError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url, retry })
    }

    async fn post(&self, text: &str) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertError::WebhookStatus(status));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send_alert(&self, message: &AlertMessage) -> Result<(), AlertError> {
        let text = message.render();
        send_with_retries(self.retry, "webhook", || self.post(&text)).await
    }
}

#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
    retry: RetryPolicy,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: i64, retry: RetryPolicy) -> Self {
        Self {
            bot: Bot::new(bot_token),
            chat_id: ChatId(chat_id),
            retry,
        }
    }

    async fn post(&self, text: &str) -> Result<(), AlertError> {
        self.bot
            .send_message(self.chat_id, text.to_owned())
            .send()
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send_alert(&self, message: &AlertMessage) -> Result<(), AlertError> {
        let text = message.render();
        send_with_retries(self.retry, "telegram", || self.post(&text)).await
    }
}
