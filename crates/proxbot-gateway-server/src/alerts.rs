use std::time::Duration;

use async_trait::async_trait;
use proxbot_common::{ProxbotError, Result};
use proxbot_orchestrator::AlertSink;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<String>,
    content: &'a str,
}

/// Posts monitor alerts to a chat webhook.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
    channel_id: Option<u64>,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, channel_id: Option<u64>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProxbotError::Config(format!("alert webhook client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            channel_id,
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send_alert(&self, message: &str) -> Result<()> {
        // Snowflakes exceed what JSON numbers carry safely.
        let payload = AlertPayload {
            channel_id: self.channel_id.map(|id| id.to_string()),
            content: message,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProxbotError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProxbotError::Api {
                status: status.as_u16(),
                message,
            });
        }
        debug!(channel = ?self.channel_id, "Alert delivered");
        Ok(())
    }
}
