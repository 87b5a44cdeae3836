use proxbot_common::Timeframe;
use serde::{Deserialize, Serialize};

/// An operator command as delivered by the chat adapter:
/// `{"name": "resize", "options": {"vmid": 100, "cores": 4, "memory_mb": 4096}}`.
///
/// Commands without parameters may omit `options`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "options", rename_all = "snake_case")]
pub enum Command {
    List,
    Info {
        vmid: u32,
    },
    Graph {
        vmid: u32,
        #[serde(default)]
        timeframe: Timeframe,
    },
    Create {
        template_id: u32,
        new_vmid: u32,
        name: String,
    },
    Resize {
        vmid: u32,
        cores: u32,
        memory_mb: u32,
    },
    Start {
        vmid: u32,
    },
    Reboot {
        vmid: u32,
    },
    Shutdown {
        vmid: u32,
    },
    Stop {
        vmid: u32,
    },
    Delete {
        vmid: u32,
    },
    SnapshotCreate {
        vmid: u32,
        name: String,
    },
    SnapshotList {
        vmid: u32,
    },
    SnapshotRollback {
        vmid: u32,
        name: String,
    },
    MonitorAdd {
        vmid: u32,
    },
    MonitorRemove {
        vmid: u32,
    },
    MonitorList,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::List => "list",
            Command::Info { .. } => "info",
            Command::Graph { .. } => "graph",
            Command::Create { .. } => "create",
            Command::Resize { .. } => "resize",
            Command::Start { .. } => "start",
            Command::Reboot { .. } => "reboot",
            Command::Shutdown { .. } => "shutdown",
            Command::Stop { .. } => "stop",
            Command::Delete { .. } => "delete",
            Command::SnapshotCreate { .. } => "snapshot_create",
            Command::SnapshotList { .. } => "snapshot_list",
            Command::SnapshotRollback { .. } => "snapshot_rollback",
            Command::MonitorAdd { .. } => "monitor_add",
            Command::MonitorRemove { .. } => "monitor_remove",
            Command::MonitorList => "monitor_list",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ParamKind {
    Integer,
    String,
    Choice(&'static [&'static str]),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    /// Values come from `GET /api/v1/autocomplete`.
    pub autocomplete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

const fn vmid(description: &'static str) -> ParamSpec {
    ParamSpec {
        name: "vmid",
        description,
        kind: ParamKind::Integer,
        required: true,
        autocomplete: true,
    }
}

const fn param(name: &'static str, description: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec {
        name,
        description,
        kind,
        required: true,
        autocomplete: false,
    }
}

fn command(name: &'static str, description: &'static str, params: Vec<ParamSpec>) -> CommandSpec {
    CommandSpec {
        name,
        description,
        params,
    }
}

/// Every command the dispatcher accepts, for slash-command registration.
pub fn catalog() -> Vec<CommandSpec> {
    vec![
        command("list", "List VMs and containers with their status", vec![]),
        command("info", "Show specs and live status of a machine", vec![vmid("Target VMID")]),
        command(
            "graph",
            "Show resource usage graphs",
            vec![
                vmid("Target VMID"),
                ParamSpec {
                    required: false,
                    ..param(
                        "timeframe",
                        "Period (hour, day, week, month)",
                        ParamKind::Choice(&["hour", "day", "week", "month"]),
                    )
                },
            ],
        ),
        command(
            "create",
            "Create a machine from a template",
            vec![
                ParamSpec {
                    autocomplete: true,
                    ..param("template_id", "Template VMID to clone", ParamKind::Integer)
                },
                param("new_vmid", "VMID of the new machine", ParamKind::Integer),
                param("name", "Name of the new machine", ParamKind::String),
            ],
        ),
        command(
            "resize",
            "Change cores and memory (applies after reboot)",
            vec![
                vmid("Target VMID"),
                param("cores", "CPU cores", ParamKind::Integer),
                param("memory_mb", "Memory in MB", ParamKind::Integer),
            ],
        ),
        command("start", "Start a machine", vec![vmid("Target VMID")]),
        command("reboot", "Reboot a machine", vec![vmid("Target VMID")]),
        command("shutdown", "ACPI shutdown (graceful)", vec![vmid("Target VMID")]),
        command("stop", "Force stop (power off)", vec![vmid("Target VMID")]),
        command("delete", "Delete a machine (data loss)", vec![vmid("Target VMID")]),
        command(
            "snapshot_create",
            "Create a snapshot",
            vec![vmid("Target VMID"), param("name", "Snapshot name", ParamKind::String)],
        ),
        command("snapshot_list", "List snapshots", vec![vmid("Target VMID")]),
        command(
            "snapshot_rollback",
            "Roll back to a snapshot (asks for confirmation)",
            vec![vmid("Target VMID"), param("name", "Snapshot name", ParamKind::String)],
        ),
        command("monitor_add", "Add a machine to the watchlist", vec![vmid("Target VMID")]),
        command("monitor_remove", "Remove a machine from the watchlist", vec![vmid("Target VMID")]),
        command("monitor_list", "Show the watchlist", vec![]),
    ]
}
