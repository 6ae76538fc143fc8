use std::collections::BTreeSet;

use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::cluster_model::placement::placement_policy::VmPlacementPolicy;

/// The physical machines of a cluster with the policy that spreads virtual machines over them.
#[derive(Debug)]
pub struct Infrastructure {
    machines: Vec<MachineId>,
    pub(crate) policy: Box<dyn VmPlacementPolicy>,
    pub(crate) known_vms: BTreeSet<MachineId>,
}

impl Infrastructure {
    pub fn new(machines: Vec<MachineId>, policy: Box<dyn VmPlacementPolicy>) -> Self {
        Infrastructure { machines, policy, known_vms: BTreeSet::new() }
    }

    pub fn get_machines(&self) -> &[MachineId] {
        &self.machines
    }

    /// Whether `vm` was placed through this infrastructure.
    pub fn knows_vm(&self, vm: MachineId) -> bool {
        self.known_vms.contains(&vm)
    }
}
