use proxbot_common::{ClusterResource, MachineRef, Result};
use tracing::{debug, warn};

use crate::bridge::HypervisorHandle;

/// Maps a bare machine id to the node and kind that currently own it.
///
/// Every lookup fetches the inventory fresh; machines migrate between nodes
/// and nothing here is cached.
#[derive(Clone)]
pub struct ResourceResolver {
    hypervisor: HypervisorHandle,
}

impl ResourceResolver {
    pub fn new(hypervisor: HypervisorHandle) -> Self {
        Self { hypervisor }
    }

    /// Cluster-wide inventory of VMs and containers.
    pub async fn inventory(&self) -> Result<Vec<ClusterResource>> {
        self.hypervisor.call(|h| h.cluster_resources()).await
    }

    /// Absent ids and inventory failures both yield `None`.
    pub async fn resolve(&self, id: u32) -> Option<MachineRef> {
        match self.inventory().await {
            Ok(resources) => {
                let found = find_machine(&resources, id);
                if found.is_none() {
                    debug!(vmid = id, "Machine not present in cluster inventory");
                }
                found
            }
            Err(e) => {
                warn!(vmid = id, error = %e, "Inventory fetch failed during resolution");
                None
            }
        }
    }
}

pub fn find_machine(resources: &[ClusterResource], id: u32) -> Option<MachineRef> {
    resources
        .iter()
        .find(|resource| resource.vmid == id)
        .map(ClusterResource::machine_ref)
}
