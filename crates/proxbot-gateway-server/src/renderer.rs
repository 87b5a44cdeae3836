use std::time::Duration;

use async_trait::async_trait;
use proxbot_common::{MetricSample, ProxbotError, Result, Timeframe};
use proxbot_orchestrator::MetricsRenderer;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    title: &'a str,
    timeframe: Timeframe,
    samples: &'a [MetricSample],
}

/// Delegates graph drawing to an external renderer that answers with PNG bytes.
pub struct HttpMetricsRenderer {
    client: reqwest::Client,
    url: String,
}

impl HttpMetricsRenderer {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProxbotError::Config(format!("renderer client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl MetricsRenderer for HttpMetricsRenderer {
    async fn render(
        &self,
        title: &str,
        timeframe: Timeframe,
        samples: &[MetricSample],
    ) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.url)
            .json(&RenderRequest {
                title,
                timeframe,
                samples,
            })
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

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProxbotError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
