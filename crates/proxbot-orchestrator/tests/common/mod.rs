#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use proxbot_orchestrator::common::{
    CloneRequest, ClusterResource, Hypervisor, MachineConfig, MachineKind, MachineRef,
    MachineStatus, MetricSample, PowerAction, PowerState, ProxbotError, Result, Snapshot,
    Timeframe,
};
use proxbot_orchestrator::{
    AlertSink, CallBridge, Dispatcher, DispatcherConfig, HypervisorHandle, InMemoryWatchlist,
    InvocationContext, MetricsRenderer, Watchlist,
};

pub const ADMIN_CATEGORY: u64 = 4242;

pub fn admin() -> InvocationContext {
    InvocationContext::in_category(ADMIN_CATEGORY)
}

/// In-memory cluster that records every call as `op:args`.
///
/// Calls whose record starts with a registered failure prefix return an API
/// error instead, e.g. `fail("power")` or `fail("status:100")`.
#[derive(Default)]
pub struct FakeHypervisor {
    resources: Mutex<Vec<ClusterResource>>,
    statuses: Mutex<HashMap<u32, MachineStatus>>,
    configs: Mutex<HashMap<u32, MachineConfig>>,
    snapshots: Mutex<HashMap<u32, Vec<Snapshot>>>,
    samples: Mutex<Vec<MetricSample>>,
    failures: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_machine(self, id: u32, node: &str, kind: MachineKind, name: &str, state: &str) -> Self {
        self.resources.lock().unwrap().push(ClusterResource {
            vmid: id,
            node: node.to_string(),
            kind,
            name: Some(name.to_string()),
            status: Some(state.to_string()),
        });
        self.statuses.lock().unwrap().insert(
            id,
            MachineStatus {
                name: Some(name.to_string()),
                power_state: PowerState::from(state.to_string()),
                ..Default::default()
            },
        );
        self
    }

    pub fn with_status(self, id: u32, status: MachineStatus) -> Self {
        self.statuses.lock().unwrap().insert(id, status);
        self
    }

    pub fn with_config(self, id: u32, config: MachineConfig) -> Self {
        self.configs.lock().unwrap().insert(id, config);
        self
    }

    pub fn with_snapshots(self, id: u32, names: &[&str]) -> Self {
        let snapshots = names
            .iter()
            .map(|name| Snapshot {
                name: name.to_string(),
                snaptime: Some(1_700_000_000),
                description: None,
            })
            .collect();
        self.snapshots.lock().unwrap().insert(id, snapshots);
        self
    }

    pub fn with_samples(self, samples: Vec<MetricSample>) -> Self {
        *self.samples.lock().unwrap() = samples;
        self
    }

    pub fn fail(&self, prefix: &str) {
        self.failures.lock().unwrap().push(prefix.to_string());
    }

    pub fn set_state(&self, id: u32, state: &str) {
        if let Some(status) = self.statuses.lock().unwrap().get_mut(&id) {
            status.power_state = PowerState::from(state.to_string());
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Calls other than inventory lookups.
    pub fn machine_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c != "cluster_resources")
            .collect()
    }

    fn record(&self, call: String) -> Result<()> {
        let failing = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| call.starts_with(prefix.as_str()));
        self.calls.lock().unwrap().push(call.clone());
        if failing {
            return Err(ProxbotError::Api {
                status: 500,
                message: format!("{call} exploded"),
            });
        }
        Ok(())
    }
}

impl Hypervisor for FakeHypervisor {
    fn cluster_resources(&self) -> Result<Vec<ClusterResource>> {
        self.record("cluster_resources".to_string())?;
        Ok(self.resources.lock().unwrap().clone())
    }

    fn machine_status(&self, machine: &MachineRef) -> Result<MachineStatus> {
        self.record(format!("status:{}", machine.id))?;
        self.statuses
            .lock()
            .unwrap()
            .get(&machine.id)
            .cloned()
            .ok_or_else(|| ProxbotError::NotFound(machine.to_string()))
    }

    fn machine_config(&self, machine: &MachineRef) -> Result<MachineConfig> {
        self.record(format!("config:{}", machine.id))?;
        Ok(self
            .configs
            .lock()
            .unwrap()
            .get(&machine.id)
            .cloned()
            .unwrap_or_default())
    }

    fn update_config(&self, machine: &MachineRef, cores: u32, memory_mb: u32) -> Result<()> {
        self.record(format!(
            "update_config:{}:{}:{cores}:{memory_mb}",
            machine.id, machine.kind
        ))
    }

    fn power(&self, machine: &MachineRef, action: PowerAction) -> Result<()> {
        self.record(format!("power:{}:{action}", machine.id))
    }

    fn clone_machine(&self, template: &MachineRef, request: &CloneRequest) -> Result<()> {
        self.record(format!(
            "clone:{}@{}:{}:{}:full={}:target={}",
            template.id,
            template.node,
            request.new_id,
            request.name,
            request.full,
            request.target_node.as_deref().unwrap_or("-")
        ))
    }

    fn delete_machine(&self, machine: &MachineRef) -> Result<()> {
        self.record(format!("delete:{}", machine.id))
    }

    fn create_snapshot(&self, machine: &MachineRef, name: &str) -> Result<()> {
        self.record(format!("snapshot_create:{}:{name}", machine.id))
    }

    fn list_snapshots(&self, machine: &MachineRef) -> Result<Vec<Snapshot>> {
        self.record(format!("snapshot_list:{}", machine.id))?;
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .get(&machine.id)
            .cloned()
            .unwrap_or_default())
    }

    fn rollback_snapshot(&self, machine: &MachineRef, name: &str) -> Result<()> {
        self.record(format!("rollback:{}:{name}", machine.id))
    }

    fn rrd_data(&self, machine: &MachineRef, timeframe: Timeframe) -> Result<Vec<MetricSample>> {
        self.record(format!("rrd:{}:{timeframe}", machine.id))?;
        Ok(self.samples.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub alerts: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send_alert(&self, message: &str) -> Result<()> {
        self.alerts.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Returns a fixed PNG payload and remembers what it was asked to draw.
#[derive(Default)]
pub struct StubRenderer {
    pub requests: Mutex<Vec<(String, Timeframe, usize)>>,
}

#[async_trait]
impl MetricsRenderer for StubRenderer {
    async fn render(
        &self,
        title: &str,
        timeframe: Timeframe,
        samples: &[MetricSample],
    ) -> Result<Vec<u8>> {
        self.requests
            .lock()
            .unwrap()
            .push((title.to_string(), timeframe, samples.len()));
        Ok(b"\x89PNG".to_vec())
    }
}

pub struct Harness {
    pub fake: Arc<FakeHypervisor>,
    pub storage: Arc<InMemoryWatchlist>,
    pub watchlist: Arc<Watchlist>,
    pub dispatcher: Dispatcher,
}

pub fn handle(fake: &Arc<FakeHypervisor>) -> HypervisorHandle {
    HypervisorHandle::new(fake.clone(), CallBridge::new(4))
}

pub fn harness(fake: FakeHypervisor) -> Harness {
    harness_with(fake, Vec::new(), |config| config)
}

pub fn harness_with(
    fake: FakeHypervisor,
    watched: Vec<u32>,
    configure: impl FnOnce(DispatcherConfig) -> DispatcherConfig,
) -> Harness {
    let fake = Arc::new(fake);
    let storage = Arc::new(InMemoryWatchlist::new(watched));
    let watchlist = Arc::new(Watchlist::new(storage.clone()));
    let mut config = DispatcherConfig::new(ADMIN_CATEGORY);
    config.delete_grace = Duration::ZERO;
    let dispatcher = Dispatcher::new(configure(config), handle(&fake), watchlist.clone());
    Harness {
        fake,
        storage,
        watchlist,
        dispatcher,
    }
}
