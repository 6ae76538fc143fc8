use slotmap::new_key_type;

use crate::domain::cluster_model::job::job::JobId;
use crate::domain::cluster_model::resource::resource_request::ResourceRequest;
use crate::domain::cluster_model::resource::resource_store::ResourceId;
use crate::domain::cluster_model::resource::resources_holder::ResourcesHolder;
use crate::domain::cluster_model::scheduler::scheduler_store::SchedulerId;
use crate::domain::cluster_model::utils::id::MachineName;

new_key_type! {
    pub struct MachineId;
}

/// The part of a machine that only virtual machines have: they request their capacity from a host.
#[derive(Debug)]
pub struct VirtualMachine {
    pub(crate) holder: ResourcesHolder,
    pub(crate) host: Option<MachineId>,
}

impl VirtualMachine {
    pub fn get_holder(&self) -> &ResourcesHolder {
        &self.holder
    }

    pub fn get_host(&self) -> Option<MachineId> {
        self.host
    }
}

/// A physical machine owning a resource pool, or a virtual machine whose pool is what its host granted.
#[derive(Debug)]
pub struct Machine {
    name: MachineName,
    index: u64,
    own_resources: Vec<ResourceId>,
    pub(crate) job_scheduler: Option<SchedulerId>,
    pub(crate) vm_scheduler: Option<SchedulerId>,
    pub(crate) running_jobs: Vec<JobId>,
    pub(crate) hosted_vms: Vec<MachineId>,
    pub(crate) virtual_machine: Option<VirtualMachine>,
}

impl Machine {
    pub fn new_physical(name: MachineName, index: u64, resources: Vec<ResourceId>) -> Self {
        Machine {
            name,
            index,
            own_resources: resources,
            job_scheduler: None,
            vm_scheduler: None,
            running_jobs: Vec::new(),
            hosted_vms: Vec::new(),
            virtual_machine: None,
        }
    }

    pub fn new_virtual(name: MachineName, index: u64, requests: Vec<ResourceRequest>) -> Self {
        let mut machine = Self::new_physical(name, index, Vec::new());
        machine.virtual_machine = Some(VirtualMachine { holder: ResourcesHolder::new(requests), host: None });
        machine
    }

    pub fn get_name(&self) -> &MachineName {
        &self.name
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_machine.is_some()
    }

    pub fn get_virtual_machine(&self) -> Option<&VirtualMachine> {
        self.virtual_machine.as_ref()
    }

    /// Host of a virtual machine, `None` for physical machines and unplaced VMs.
    pub fn get_host(&self) -> Option<MachineId> {
        self.virtual_machine.as_ref().and_then(|vm| vm.host)
    }

    /// The pool jobs on this machine allocate from: own units, or the grants of a virtual machine in request order.
    pub fn get_resources(&self) -> Vec<ResourceId> {
        match &self.virtual_machine {
            Some(vm) => vm.holder.get_obtained_resources(),
            None => self.own_resources.clone(),
        }
    }

    pub fn get_job_scheduler(&self) -> Option<SchedulerId> {
        self.job_scheduler
    }

    pub fn get_vm_scheduler(&self) -> Option<SchedulerId> {
        self.vm_scheduler
    }

    pub fn get_running_jobs(&self) -> &[JobId] {
        &self.running_jobs
    }

    pub fn get_hosted_vms(&self) -> &[MachineId] {
        &self.hosted_vms
    }

    pub fn is_idle(&self) -> bool {
        self.running_jobs.is_empty() && self.hosted_vms.is_empty()
    }
}
