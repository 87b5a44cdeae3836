//! Operator command handling.
//!
//! Every entry point runs the [`AccessGate`] first and returns its denial
//! without touching the hypervisor. Commands that target an existing machine
//! resolve it before doing anything else; an unresolvable id ends the
//! command with "not found" and no side effects. Hypervisor failures become
//! `"{action} failed: {detail}"` replies and never escape as errors.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use proxbot_common::{
    CloneRequest, ClusterResource, MachineKind, MachineRef, MachineStatus, PowerAction,
    PowerState, Snapshot, Timeframe,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::access::{AccessGate, InvocationContext};
use crate::bridge::HypervisorHandle;
use crate::command::Command;
use crate::prompt::{Choice, Claim, PromptAction, PromptRegistry};
use crate::render::MetricsRenderer;
use crate::reply::{format_cpu, format_memory, format_uptime, Attachment, Color, Embed, Reply};
use crate::resolver::ResourceResolver;
use crate::watchlist::Watchlist;
use crate::DispatchError;

pub const DELETE_GRACE: Duration = Duration::from_secs(2);
pub const STOP_PROMPT_TIMEOUT: Duration = Duration::from_secs(180);
pub const ROLLBACK_PROMPT_TIMEOUT: Duration = Duration::from_secs(60);
pub const CONTROL_PROMPT_TIMEOUT: Duration = Duration::from_secs(180);
pub const MAX_AUTOCOMPLETE_CHOICES: usize = 25;

// Proxmox lists the live state as a pseudo-snapshot named "current".
const CURRENT_STATE: &str = "current";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub admin_category_id: u64,
    /// Clone target for `create` when it differs from the template's node.
    pub default_node: Option<String>,
    /// Pause between the pre-delete stop and the delete.
    pub delete_grace: Duration,
    pub stop_prompt_timeout: Duration,
    pub rollback_prompt_timeout: Duration,
    pub control_prompt_timeout: Duration,
}

impl DispatcherConfig {
    pub fn new(admin_category_id: u64) -> Self {
        Self {
            admin_category_id,
            default_node: None,
            delete_grace: DELETE_GRACE,
            stop_prompt_timeout: STOP_PROMPT_TIMEOUT,
            rollback_prompt_timeout: ROLLBACK_PROMPT_TIMEOUT,
            control_prompt_timeout: CONTROL_PROMPT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutocompleteChoice {
    pub name: String,
    pub value: u32,
}

pub struct Dispatcher {
    config: DispatcherConfig,
    gate: AccessGate,
    hypervisor: HypervisorHandle,
    resolver: ResourceResolver,
    watchlist: Arc<Watchlist>,
    prompts: PromptRegistry,
    renderer: Option<Arc<dyn MetricsRenderer>>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        hypervisor: HypervisorHandle,
        watchlist: Arc<Watchlist>,
    ) -> Self {
        Self {
            gate: AccessGate::new(config.admin_category_id),
            resolver: ResourceResolver::new(hypervisor.clone()),
            config,
            hypervisor,
            watchlist,
            prompts: PromptRegistry::new(),
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn MetricsRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn prompts(&self) -> &PromptRegistry {
        &self.prompts
    }

    #[instrument(skip(self, ctx, command), fields(command = command.name()))]
    pub async fn handle(&self, ctx: &InvocationContext, command: Command) -> Reply {
        if let Some(denial) = self.gate.check(ctx) {
            warn!(category_id = ?ctx.category_id, "Command rejected outside admin category");
            return Reply::ephemeral(denial);
        }

        match command {
            Command::List => self.list().await,
            Command::Info { vmid } => self.info(vmid).await,
            Command::Graph { vmid, timeframe } => self.graph(vmid, timeframe).await,
            Command::Create {
                template_id,
                new_vmid,
                name,
            } => self.create(template_id, new_vmid, name).await,
            Command::Resize {
                vmid,
                cores,
                memory_mb,
            } => self.resize(vmid, cores, memory_mb).await,
            Command::Start { vmid } => self.power(vmid, PowerAction::Start).await,
            Command::Reboot { vmid } => self.power(vmid, PowerAction::Reboot).await,
            Command::Shutdown { vmid } => self.power(vmid, PowerAction::Shutdown).await,
            Command::Stop { vmid } => self.request_stop(vmid),
            Command::Delete { vmid } => self.delete(vmid).await,
            Command::SnapshotCreate { vmid, name } => self.snapshot_create(vmid, name).await,
            Command::SnapshotList { vmid } => self.snapshot_list(vmid).await,
            Command::SnapshotRollback { vmid, name } => self.request_rollback(vmid, name).await,
            Command::MonitorAdd { vmid } => self.monitor_add(vmid).await,
            Command::MonitorRemove { vmid } => self.monitor_remove(vmid).await,
            Command::MonitorList => self.monitor_list().await,
        }
    }

    /// Answers a pending prompt. The bound action runs at most once.
    #[instrument(skip(self, ctx))]
    pub async fn resolve_prompt(&self, ctx: &InvocationContext, id: Uuid, choice: Choice) -> Reply {
        if let Some(denial) = self.gate.check(ctx) {
            return Reply::ephemeral(denial);
        }

        let claim = match self.prompts.claim(id, choice) {
            Ok(claim) => claim,
            Err(e) => return Reply::ephemeral(format!("⚠️ {e}")),
        };

        match claim {
            Claim::Cancelled { view } => {
                info!(prompt_id = %id, "Prompt cancelled");
                Reply::ephemeral("Cancelled.").with_prompt(view)
            }
            Claim::Confirmed {
                action,
                choice,
                view,
            } => {
                info!(prompt_id = %id, ?choice, "Prompt confirmed");
                let reply = match action {
                    PromptAction::ForceStop { vmid } => self.force_stop(vmid).await,
                    PromptAction::Rollback { target, snapshot } => {
                        self.rollback(target, snapshot).await
                    }
                    PromptAction::ControlPanel { target, .. } => match choice.power_action() {
                        Some(action) => self.power_on(target, action).await,
                        None => Reply::ephemeral(format!("⚠️ {}", DispatchError::ChoiceUnavailable)),
                    },
                };
                reply.with_prompt(view)
            }
        }
    }

    /// Machines whose id or name contains `query`, formatted for a
    /// slash-command autocomplete. Failures yield no choices.
    pub async fn autocomplete(&self, query: &str) -> Vec<AutocompleteChoice> {
        let resources = match self.resolver.inventory().await {
            Ok(resources) => resources,
            Err(e) => {
                warn!(error = %e, "Autocomplete inventory fetch failed");
                return Vec::new();
            }
        };
        let needle = query.to_lowercase();
        resources
            .iter()
            .filter(|r| {
                r.vmid.to_string().contains(query)
                    || display_name(r).to_lowercase().contains(&needle)
            })
            .take(MAX_AUTOCOMPLETE_CHOICES)
            .map(|r| AutocompleteChoice {
                name: format!("{}: {} ({})", r.vmid, display_name(r), r.kind),
                value: r.vmid,
            })
            .collect()
    }

    async fn resolve(&self, vmid: u32) -> Result<MachineRef, Reply> {
        self.resolver
            .resolve(vmid)
            .await
            .ok_or_else(|| not_found(vmid))
    }

    async fn list(&self) -> Reply {
        let mut resources = match self.resolver.inventory().await {
            Ok(resources) => resources,
            Err(e) => return failure("fetch", e),
        };
        resources.sort_by_key(|r| r.vmid);

        let lines: Vec<String> = resources
            .iter()
            .map(|r| {
                format!(
                    "{} {} **{}**: {} ({})",
                    if r.is_running() { "🟢" } else { "🔴" },
                    kind_icon(r.kind),
                    r.vmid,
                    display_name(r),
                    r.kind
                )
            })
            .collect();
        let description = if lines.is_empty() {
            "No machines found.".to_string()
        } else {
            lines.join("\n")
        };
        Reply::embed(Embed::new("📦 Proxmox VM/LXC List", Color::Blue).description(description))
    }

    async fn info(&self, vmid: u32) -> Reply {
        let target = match self.resolve(vmid).await {
            Ok(target) => target,
            Err(reply) => return reply,
        };

        let status_target = target.clone();
        let status = match self
            .hypervisor
            .call(move |h| h.machine_status(&status_target))
            .await
        {
            Ok(status) => status,
            Err(e) => return failure("info fetch", e),
        };
        let config_target = target.clone();
        let config = match self
            .hypervisor
            .call(move |h| h.machine_config(&config_target))
            .await
        {
            Ok(config) => config,
            Err(e) => return failure("info fetch", e),
        };

        let running = status.power_state == PowerState::Running;
        let embed = info_embed(&target, &status, config.cores, config.net0.as_deref());
        let panel = self.prompts.open(
            PromptAction::ControlPanel {
                target,
                running,
            },
            format!("Machine controls for VMID {vmid}"),
            self.config.control_prompt_timeout,
        );
        Reply::embed(embed).with_prompt(panel)
    }

    async fn graph(&self, vmid: u32, timeframe: Timeframe) -> Reply {
        let Some(renderer) = self.renderer.clone() else {
            return Reply::ephemeral("❌ graph rendering is not configured.");
        };
        let target = match self.resolve(vmid).await {
            Ok(target) => target,
            Err(reply) => return reply,
        };

        let rrd_target = target.clone();
        let samples = match self
            .hypervisor
            .call(move |h| h.rrd_data(&rrd_target, timeframe))
            .await
        {
            Ok(samples) => samples,
            Err(e) => return failure("graph", e),
        };
        if samples.is_empty() {
            return Reply::text(format!("⚠️ No data found (timeframe: {timeframe})"));
        }

        let name = match self.hypervisor.call(move |h| h.machine_status(&target)).await {
            Ok(status) => status.name.unwrap_or_else(|| format!("VM {vmid}")),
            Err(e) => return failure("graph", e),
        };
        let title = format!("{name} (ID: {vmid}) - Last {timeframe}");

        match renderer.render(&title, timeframe, &samples).await {
            Ok(png) => Reply::text(format!("📊 **Performance Graph**: {title}")).with_attachment(
                Attachment::png(format!("graph_{vmid}_{timeframe}.png"), &png),
            ),
            Err(e) => failure("graph", e),
        }
    }

    async fn create(&self, template_id: u32, new_vmid: u32, name: String) -> Reply {
        let template = match self.resolve(template_id).await {
            Ok(template) => template,
            Err(reply) => return reply,
        };
        let request = CloneRequest {
            new_id: new_vmid,
            name: name.clone(),
            full: true,
            target_node: self
                .config
                .default_node
                .clone()
                .filter(|node| *node != template.node),
        };

        match self
            .hypervisor
            .call(move |h| h.clone_machine(&template, &request))
            .await
        {
            Ok(()) => {
                info!(template_id, new_vmid, %name, "Machine cloned from template");
                Reply::text(format!(
                    "✅ **Created**: `{name}` (ID: {new_vmid})\nStart it with `/start vmid:{new_vmid}`"
                ))
            }
            Err(e) => failure("create", e),
        }
    }

    async fn resize(&self, vmid: u32, cores: u32, memory_mb: u32) -> Reply {
        let target = match self.resolve(vmid).await {
            Ok(target) => target,
            Err(reply) => return reply,
        };
        match self
            .hypervisor
            .call(move |h| h.update_config(&target, cores, memory_mb))
            .await
        {
            Ok(()) => {
                info!(vmid, cores, memory_mb, "Machine resized");
                Reply::text(format!(
                    "⚙️ **Config updated**: VMID {vmid} → {cores} Cores, {memory_mb} MB\n⚠️ Changes apply after the next reboot."
                ))
            }
            Err(e) => failure("resize", e),
        }
    }

    async fn power(&self, vmid: u32, action: PowerAction) -> Reply {
        match self.resolve(vmid).await {
            Ok(target) => self.power_on(target, action).await,
            Err(reply) => reply,
        }
    }

    async fn power_on(&self, target: MachineRef, action: PowerAction) -> Reply {
        let vmid = target.id;
        match self.hypervisor.call(move |h| h.power(&target, action)).await {
            Ok(()) => {
                info!(vmid, %action, "Power action issued");
                Reply::text(match action {
                    PowerAction::Start => format!("▶️ VMID {vmid} started."),
                    PowerAction::Reboot => format!("🔄 VMID {vmid} is rebooting..."),
                    PowerAction::Shutdown => format!("🛑 **Shutdown signal sent**: VMID {vmid}"),
                    PowerAction::Stop => format!("⚡ **Force stopped**: VMID {vmid}"),
                })
            }
            Err(e) => failure(action.as_str(), e),
        }
    }

    fn request_stop(&self, vmid: u32) -> Reply {
        let view = self.prompts.open(
            PromptAction::ForceStop { vmid },
            format!("⚠️ **Warning**: force stop VMID {vmid}?\nUnsaved data may be lost."),
            self.config.stop_prompt_timeout,
        );
        Reply::default().with_prompt(view).private()
    }

    async fn force_stop(&self, vmid: u32) -> Reply {
        self.power(vmid, PowerAction::Stop).await
    }

    async fn delete(&self, vmid: u32) -> Reply {
        let target = match self.resolve(vmid).await {
            Ok(target) => target,
            Err(reply) => return reply,
        };

        let stop_target = target.clone();
        if let Err(e) = self
            .hypervisor
            .call(move |h| h.power(&stop_target, PowerAction::Stop))
            .await
        {
            warn!(vmid, error = %e, "Pre-delete stop failed, deleting anyway");
        }
        tokio::time::sleep(self.config.delete_grace).await;

        match self.hypervisor.call(move |h| h.delete_machine(&target)).await {
            Ok(()) => {
                info!(vmid, "Machine deleted");
                Reply::text(format!("🗑️ **Deleted**: VMID {vmid}"))
            }
            Err(e) => failure("delete", e),
        }
    }

    async fn snapshot_create(&self, vmid: u32, name: String) -> Reply {
        let target = match self.resolve(vmid).await {
            Ok(target) => target,
            Err(reply) => return reply,
        };
        let snapname = name.clone();
        match self
            .hypervisor
            .call(move |h| h.create_snapshot(&target, &snapname))
            .await
        {
            Ok(()) => {
                info!(vmid, snapshot = %name, "Snapshot created");
                Reply::text(format!("📸 **Snapshot created**: {name} (VMID: {vmid})"))
            }
            Err(e) => failure("snapshot create", e),
        }
    }

    async fn snapshot_list(&self, vmid: u32) -> Reply {
        let target = match self.resolve(vmid).await {
            Ok(target) => target,
            Err(reply) => return reply,
        };
        let snapshots = match self.snapshots(target).await {
            Ok(snapshots) => snapshots,
            Err(e) => return failure("snapshot list", e),
        };

        let description = if snapshots.is_empty() {
            "No snapshots.".to_string()
        } else {
            snapshots
                .iter()
                .map(|s| format!("• **{}**", s.name))
                .collect::<Vec<_>>()
                .join("\n")
        };
        Reply::embed(
            Embed::new(format!("📸 Snapshots: VMID {vmid}"), Color::Blue).description(description),
        )
    }

    async fn request_rollback(&self, vmid: u32, name: String) -> Reply {
        let target = match self.resolve(vmid).await {
            Ok(target) => target,
            Err(reply) => return reply.private(),
        };
        let snapshots = match self.snapshots(target.clone()).await {
            Ok(snapshots) => snapshots,
            Err(e) => return failure("rollback", e).private(),
        };
        if !snapshots.iter().any(|s| s.name == name) {
            return Reply::ephemeral(format!("❌ snapshot `{name}` not found."));
        }

        let view = self.prompts.open(
            PromptAction::Rollback {
                target,
                snapshot: name.clone(),
            },
            format!(
                "⚠️ **Warning**: roll back VMID {vmid} to snapshot `{name}`?\nThe current state will be lost."
            ),
            self.config.rollback_prompt_timeout,
        );
        Reply::default().with_prompt(view).private()
    }

    async fn rollback(&self, target: MachineRef, snapshot: String) -> Reply {
        let vmid = target.id;
        let snapname = snapshot.clone();
        match self
            .hypervisor
            .call(move |h| h.rollback_snapshot(&target, &snapname))
            .await
        {
            Ok(()) => {
                info!(vmid, %snapshot, "Rolled back to snapshot");
                Reply::text(format!("✅ **Rollback complete**: {snapshot}"))
            }
            Err(e) => failure("rollback", e),
        }
    }

    async fn snapshots(&self, target: MachineRef) -> proxbot_common::Result<Vec<Snapshot>> {
        let mut snapshots = self
            .hypervisor
            .call(move |h| h.list_snapshots(&target))
            .await?;
        snapshots.retain(|s| s.name != CURRENT_STATE);
        Ok(snapshots)
    }

    async fn monitor_add(&self, vmid: u32) -> Reply {
        match self.watchlist.add(vmid, &self.resolver).await {
            Ok(()) => Reply::text(format!("✅ Now monitoring VMID {vmid}")),
            Err(e @ DispatchError::AlreadyMonitored(_)) => Reply::ephemeral(format!("⚠️ {e}")),
            Err(e) => Reply::ephemeral(format!("❌ {e}")),
        }
    }

    async fn monitor_remove(&self, vmid: u32) -> Reply {
        match self.watchlist.remove(vmid).await {
            Ok(()) => Reply::text(format!("🗑️ Stopped monitoring VMID {vmid}")),
            Err(e) => Reply::ephemeral(format!("⚠️ {e}")),
        }
    }

    async fn monitor_list(&self) -> Reply {
        let ids = self.watchlist.ids().await;
        if ids.is_empty() {
            return Reply::text("No machines are being monitored.");
        }

        let by_id: HashMap<u32, ClusterResource> = match self.resolver.inventory().await {
            Ok(resources) => resources.into_iter().map(|r| (r.vmid, r)).collect(),
            Err(e) => {
                warn!(error = %e, "Inventory fetch failed while listing watchlist");
                HashMap::new()
            }
        };
        let lines: Vec<String> = ids
            .iter()
            .map(|id| match by_id.get(id) {
                Some(r) => format!(
                    "• **{id}**: {} ({}) - {}",
                    display_name(r),
                    r.kind,
                    r.status.as_deref().unwrap_or("unknown")
                ),
                None => format!("• **{id}**: (Unknown/Deleted)"),
            })
            .collect();

        Reply::embed(Embed::new("👀 Monitored Machines", Color::Gold).description(lines.join("\n")))
    }
}

fn info_embed(
    target: &MachineRef,
    status: &MachineStatus,
    cores: Option<u64>,
    net0: Option<&str>,
) -> Embed {
    let kind = target.kind.label();
    let name = status.name.as_deref().unwrap_or("Unknown");
    let color = if status.power_state == PowerState::Running {
        Color::Green
    } else {
        Color::Red
    };

    Embed::new(format!("ℹ️ {kind} Info: {name}"), color)
        .field("VMID", target.id.to_string(), true)
        .field("Type", kind, true)
        .field("Status", status.power_state.as_str().to_uppercase(), true)
        .field("CPU", format_cpu(cores, status.cpu), true)
        .field("Memory", format_memory(status.mem, status.maxmem), true)
        .field("Uptime", format_uptime(status.uptime), true)
        .field("Network (net0)", format!("`{}`", net0.unwrap_or("N/A")), false)
}

fn kind_icon(kind: MachineKind) -> &'static str {
    match kind {
        MachineKind::Vm => "🖥️",
        MachineKind::Container => "📦",
    }
}

fn display_name(resource: &ClusterResource) -> &str {
    resource.name.as_deref().unwrap_or("Unknown")
}

fn not_found(vmid: u32) -> Reply {
    Reply::text(format!("❌ {}", DispatchError::MachineNotFound(vmid)))
}

fn failure(action: &str, err: impl Display) -> Reply {
    error!(action, error = %err, "Hypervisor call failed");
    Reply::text(format!("❌ {action} failed: {err}"))
}
