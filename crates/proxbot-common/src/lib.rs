// Re-export dependencies used in public interfaces of common types

use std::fmt::{self, Display};

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
pub use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxbotError {
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal Error: {0}")]
    Internal(String),
}

// Define the primary Result type for proxbot operations
pub type Result<T> = std::result::Result<T, ProxbotError>;

/// The two machine families a node hosts, each with its own API path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineKind {
    #[serde(rename = "qemu")]
    Vm,
    #[serde(rename = "lxc")]
    Container,
}

impl MachineKind {
    /// Path segment of the endpoint family under `/nodes/{node}/`.
    pub fn path_segment(&self) -> &'static str {
        match self {
            MachineKind::Vm => "qemu",
            MachineKind::Container => "lxc",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MachineKind::Vm => "QEMU",
            MachineKind::Container => "LXC",
        }
    }
}

impl Display for MachineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// A machine id resolved to the node that currently owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRef {
    pub id: u32,
    pub node: String,
    pub kind: MachineKind,
}

impl MachineRef {
    /// API path of this machine relative to `/api2/json`.
    pub fn api_path(&self) -> String {
        format!("nodes/{}/{}/{}", self.node, self.kind.path_segment(), self.id)
    }
}

impl Display for MachineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.node, self.kind, self.id)
    }
}

/// One entry of the cluster-wide resource inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResource {
    #[serde(deserialize_with = "lenient_vmid")]
    pub vmid: u32,
    pub node: String,
    #[serde(rename = "type")]
    pub kind: MachineKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ClusterResource {
    pub fn machine_ref(&self) -> MachineRef {
        MachineRef {
            id: self.vmid,
            node: self.node.clone(),
            kind: self.kind,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status.as_deref() == Some("running")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PowerState {
    Running,
    Stopped,
    Other(String),
}

impl PowerState {
    pub fn as_str(&self) -> &str {
        match self {
            PowerState::Running => "running",
            PowerState::Stopped => "stopped",
            PowerState::Other(s) => s,
        }
    }
}

impl Default for PowerState {
    fn default() -> Self {
        PowerState::Other("unknown".to_string())
    }
}

impl From<String> for PowerState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "running" => PowerState::Running,
            "stopped" => PowerState::Stopped,
            _ => PowerState::Other(value),
        }
    }
}

impl From<PowerState> for String {
    fn from(value: PowerState) -> Self {
        value.as_str().to_string()
    }
}

impl Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live status snapshot from `status/current`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineStatus {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "status")]
    pub power_state: PowerState,
    /// Fraction of allotted CPU in use, 0.0 to 1.0.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cpu: f64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub mem: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub maxmem: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub uptime: u64,
}

/// The slice of machine configuration the dispatcher reads or replaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub cores: Option<u64>,
    #[serde(default, rename = "memory", deserialize_with = "lenient_opt_u64")]
    pub memory_mb: Option<u64>,
    #[serde(default)]
    pub net0: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    #[serde(default)]
    pub snaptime: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Snapshot {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.snaptime
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }
}

/// One raw time-series point from `rrddata`. Forwarded to the renderer as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub mem: Option<f64>,
    #[serde(default)]
    pub netin: Option<f64>,
    #[serde(default)]
    pub netout: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    Start,
    /// Hard power-off.
    Stop,
    /// ACPI shutdown.
    Shutdown,
    Reboot,
}

impl PowerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerAction::Start => "start",
            PowerAction::Stop => "stop",
            PowerAction::Shutdown => "shutdown",
            PowerAction::Reboot => "reboot",
        }
    }
}

impl Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[default]
    Hour,
    Day,
    Week,
    Month,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Hour => "hour",
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
        }
    }
}

impl Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneRequest {
    pub new_id: u32,
    pub name: String,
    /// Full copy instead of a linked clone.
    pub full: bool,
    pub target_node: Option<String>,
}

/// Blocking access to the hypervisor API.
///
/// Implementations perform network I/O on the calling thread; async callers
/// go through the orchestrator's call bridge.
pub trait Hypervisor: Send + Sync {
    fn cluster_resources(&self) -> Result<Vec<ClusterResource>>;

    fn machine_status(&self, machine: &MachineRef) -> Result<MachineStatus>;

    fn machine_config(&self, machine: &MachineRef) -> Result<MachineConfig>;

    /// Replaces cores and memory together; takes effect on next reboot.
    fn update_config(&self, machine: &MachineRef, cores: u32, memory_mb: u32) -> Result<()>;

    fn power(&self, machine: &MachineRef, action: PowerAction) -> Result<()>;

    fn clone_machine(&self, template: &MachineRef, request: &CloneRequest) -> Result<()>;

    fn delete_machine(&self, machine: &MachineRef) -> Result<()>;

    fn create_snapshot(&self, machine: &MachineRef, name: &str) -> Result<()>;

    fn list_snapshots(&self, machine: &MachineRef) -> Result<Vec<Snapshot>>;

    fn rollback_snapshot(&self, machine: &MachineRef, name: &str) -> Result<()>;

    fn rrd_data(&self, machine: &MachineRef, timeframe: Timeframe) -> Result<Vec<MetricSample>>;
}

// The API reports numbers as JSON numbers or numeric strings depending on
// endpoint and version.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(u64),
    Float(f64),
    Str(String),
}

impl NumberOrString {
    fn to_f64<E: de::Error>(self) -> std::result::Result<f64, E> {
        match self {
            NumberOrString::Int(v) => Ok(v as f64),
            NumberOrString::Float(v) => Ok(v),
            NumberOrString::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| E::custom(format!("expected a number, got {s:?}"))),
        }
    }
}

pub fn lenient_vmid<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = NumberOrString::deserialize(deserializer)?.to_f64::<D::Error>()?;
    if value.fract() != 0.0 || value < 0.0 || value > u32::MAX as f64 {
        return Err(de::Error::custom(format!("invalid vmid {value}")));
    }
    Ok(value as u32)
}

pub fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_u64(deserializer)?.unwrap_or(0))
}

pub fn lenient_opt_u64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(value) => Ok(Some(value.to_f64::<D::Error>()?.max(0.0) as u64)),
    }
}

pub fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(0.0),
        Some(value) => value.to_f64::<D::Error>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_resource_accepts_string_vmid() {
        let json = r#"[
            {"vmid": 100, "node": "pve1", "type": "qemu", "name": "web", "status": "running"},
            {"vmid": "105", "node": "pve2", "type": "lxc", "name": "dns"}
        ]"#;
        let resources: Vec<ClusterResource> = serde_json::from_str(json).unwrap();

        assert_eq!(resources[0].vmid, 100);
        assert_eq!(resources[0].kind, MachineKind::Vm);
        assert!(resources[0].is_running());
        assert_eq!(resources[1].vmid, 105);
        assert_eq!(resources[1].kind, MachineKind::Container);
        assert_eq!(resources[1].status, None);
        assert_eq!(resources[1].machine_ref().api_path(), "nodes/pve2/lxc/105");
    }

    #[test]
    fn test_status_defaults_and_power_state() {
        let status: MachineStatus =
            serde_json::from_str(r#"{"name": "db", "status": "stopped", "maxmem": "2147483648"}"#)
                .unwrap();
        assert_eq!(status.power_state, PowerState::Stopped);
        assert_eq!(status.maxmem, 2_147_483_648);
        assert_eq!(status.mem, 0);
        assert_eq!(status.cpu, 0.0);

        let paused: MachineStatus = serde_json::from_str(r#"{"status": "paused"}"#).unwrap();
        assert_eq!(paused.power_state, PowerState::Other("paused".to_string()));
        assert_eq!(paused.power_state.as_str(), "paused");
    }

    #[test]
    fn test_config_memory_as_string() {
        let config: MachineConfig =
            serde_json::from_str(r#"{"cores": 2, "memory": "4096", "net0": "virtio=AA:BB,bridge=vmbr0"}"#)
                .unwrap();
        assert_eq!(config.cores, Some(2));
        assert_eq!(config.memory_mb, Some(4096));
        assert!(config.net0.unwrap().starts_with("virtio"));
    }

    #[test]
    fn test_snapshot_created_at() {
        let snap = Snapshot {
            name: "pre-upgrade".to_string(),
            snaptime: Some(1_700_000_000),
            description: None,
        };
        assert_eq!(snap.created_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_kind_paths() {
        assert_eq!(MachineKind::Vm.path_segment(), "qemu");
        assert_eq!(MachineKind::Container.label(), "LXC");
        assert_eq!(PowerAction::Shutdown.to_string(), "shutdown");
        assert_eq!(Timeframe::default(), Timeframe::Hour);
    }
}
