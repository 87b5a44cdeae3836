use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proxbot_common::{PowerState, Result};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::bridge::HypervisorHandle;
use crate::resolver::ResourceResolver;
use crate::watchlist::Watchlist;

pub const MONITOR_PERIOD: Duration = Duration::from_secs(60);

/// Where stopped-machine alerts go.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, message: &str) -> Result<()>;
}

/// Sink used when no alert destination is configured.
#[derive(Debug, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send_alert(&self, message: &str) -> Result<()> {
        warn!(alert = message, "No alert destination configured");
        Ok(())
    }
}

pub fn stopped_alert(vmid: u32, name: &str) -> String {
    format!("🚨 **ALERT**: VMID {vmid} ({name}) is stopped!")
}

/// Periodic health check over the watchlist.
///
/// Every tick reloads the list, resolves each id and alerts for each machine
/// whose power state is exactly `stopped`. A machine that stays stopped
/// alerts on every tick.
pub struct Monitor {
    hypervisor: HypervisorHandle,
    resolver: ResourceResolver,
    watchlist: Arc<Watchlist>,
    sink: Arc<dyn AlertSink>,
    period: Duration,
}

impl Monitor {
    pub fn new(
        hypervisor: HypervisorHandle,
        watchlist: Arc<Watchlist>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            resolver: ResourceResolver::new(hypervisor.clone()),
            hypervisor,
            watchlist,
            sink,
            period: MONITOR_PERIOD,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// One pass over the watchlist. Returns how many alerts were delivered.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> usize {
        let ids = self.watchlist.ids().await;
        debug!(count = ids.len(), "Checking watched machines");

        let mut alerts = 0;
        for id in ids {
            match self.check(id).await {
                Ok(true) => alerts += 1,
                Ok(false) => {}
                Err(e) => error!(vmid = id, error = %e, "Monitor check failed"),
            }
        }
        alerts
    }

    async fn check(&self, id: u32) -> Result<bool> {
        let Some(target) = self.resolver.resolve(id).await else {
            return Ok(false);
        };
        let status = self
            .hypervisor
            .call(move |h| h.machine_status(&target))
            .await?;

        if status.power_state != PowerState::Stopped {
            return Ok(false);
        }
        let name = status.name.as_deref().unwrap_or("Unknown");
        self.sink.send_alert(&stopped_alert(id, name)).await?;
        info!(vmid = id, "Stopped machine alert sent");
        Ok(true)
    }

    /// Waits for `ready` to turn true, then ticks every period until
    /// `shutdown` turns true or its sender goes away.
    pub async fn run(self, mut ready: watch::Receiver<bool>, mut shutdown: watch::Receiver<bool>) {
        let started = tokio::select! {
            became_ready = until_true(&mut ready) => became_ready,
            _ = until_true(&mut shutdown) => false,
        };
        if !started {
            warn!("Monitor exiting before readiness");
            return;
        }
        info!(period_secs = self.period.as_secs(), "Monitor started");

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let alerts = self.tick().await;
                    debug!(alerts, "Monitor tick complete");
                }
                _ = until_true(&mut shutdown) => break,
            }
        }
        info!("Monitor stopped");
    }
}

/// Resolves once the flag is true. `false` means the sender was dropped first.
async fn until_true(rx: &mut watch::Receiver<bool>) -> bool {
    rx.wait_for(|flag| *flag).await.is_ok()
}
