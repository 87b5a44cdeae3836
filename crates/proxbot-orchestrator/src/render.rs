use async_trait::async_trait;
use proxbot_common::{MetricSample, Result, Timeframe};

/// Turns a raw metric series into a PNG chart.
///
/// Samples are passed through exactly as the hypervisor reported them.
#[async_trait]
pub trait MetricsRenderer: Send + Sync {
    async fn render(
        &self,
        title: &str,
        timeframe: Timeframe,
        samples: &[MetricSample],
    ) -> Result<Vec<u8>>;
}
