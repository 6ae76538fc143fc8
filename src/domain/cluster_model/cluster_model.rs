use slotmap::SlotMap;

use crate::domain::cluster_model::job::job::{Job, JobId, Operations};
use crate::domain::cluster_model::machine::machine::{Machine, MachineId};
use crate::domain::cluster_model::resource::resource::{Resource, ResourceType};
use crate::domain::cluster_model::resource::resource_request::{INF, ResourceRequest};
use crate::domain::cluster_model::resource::resource_store::{ResourceId, ResourceStore};
use crate::domain::cluster_model::resource::resources_holder::{Grant, Holder, ResourcesHolder};
use crate::domain::cluster_model::utils::id::{JobName, MachineName};
use crate::error::{Error, Result};

/// Every resource, job and machine of one simulation, addressed by arena keys.
#[derive(Debug)]
pub struct ClusterModel {
    pub(crate) resources: ResourceStore,
    pub(crate) jobs: SlotMap<JobId, Job>,
    pub(crate) machines: SlotMap<MachineId, Machine>,
    release_epsilon: f64,
    next_job_index: u64,
    next_machine_index: u64,
}

impl ClusterModel {
    pub fn new(release_epsilon: f64) -> Self {
        ClusterModel {
            resources: ResourceStore::new(),
            jobs: SlotMap::with_key(),
            machines: SlotMap::with_key(),
            release_epsilon,
            next_job_index: 0,
            next_machine_index: 0,
        }
    }

    // --- Construction ---

    pub fn add_machine(&mut self, name: &str, resources: Vec<Resource>) -> MachineId {
        let ids = resources.into_iter().map(|r| self.resources.add(r)).collect();
        let index = self.next_machine_index;
        self.next_machine_index += 1;
        self.machines.insert(Machine::new_physical(MachineName::new(name), index, ids))
    }

    pub fn add_virtual_machine(&mut self, name: &str, requests: Vec<ResourceRequest>) -> MachineId {
        let index = self.next_machine_index;
        self.next_machine_index += 1;
        self.machines.insert(Machine::new_virtual(MachineName::new(name), index, requests))
    }

    /// Adds a job; without a name it is called `Job_<index>`.
    pub fn add_job(&mut self, name: Option<&str>, operations: Operations, requests: Vec<ResourceRequest>) -> Result<JobId> {
        let index = self.next_job_index;
        let name = name.map(str::to_string).unwrap_or_else(|| format!("Job_{}", index));
        let job = Job::new(JobName::new(name), index, operations, requests)?;
        self.next_job_index += 1;
        Ok(self.jobs.insert(job))
    }

    // --- Lookup ---

    pub fn get_resources(&self) -> &ResourceStore {
        &self.resources
    }

    pub fn get_resource(&self, id: ResourceId) -> Result<&Resource> {
        self.resources.get(id)
    }

    pub fn get_job(&self, id: JobId) -> Result<&Job> {
        self.jobs.get(id).ok_or_else(|| Error::NotFound(format!("job {:?}", id)))
    }

    pub(crate) fn get_job_mut(&mut self, id: JobId) -> Result<&mut Job> {
        self.jobs.get_mut(id).ok_or_else(|| Error::NotFound(format!("job {:?}", id)))
    }

    pub fn get_machine(&self, id: MachineId) -> Result<&Machine> {
        self.machines.get(id).ok_or_else(|| Error::NotFound(format!("machine {:?}", id)))
    }

    pub(crate) fn get_machine_mut(&mut self, id: MachineId) -> Result<&mut Machine> {
        self.machines.get_mut(id).ok_or_else(|| Error::NotFound(format!("machine {:?}", id)))
    }

    pub fn jobs(&self) -> impl Iterator<Item = (JobId, &Job)> {
        self.jobs.iter()
    }

    pub fn machines(&self) -> impl Iterator<Item = (MachineId, &Machine)> {
        self.machines.iter()
    }

    pub fn get_holder(&self, holder: Holder) -> Result<&ResourcesHolder> {
        match holder {
            Holder::Job(job) => Ok(&self.get_job(job)?.holder),
            Holder::Vm(vm) => self.get_machine(vm)?.virtual_machine.as_ref().map(|v| &v.holder).ok_or_else(|| Error::NotFound(format!("virtual machine {:?}", vm))),
        }
    }

    fn get_holder_mut(&mut self, holder: Holder) -> Result<&mut ResourcesHolder> {
        match holder {
            Holder::Job(job) => Ok(&mut self.get_job_mut(job)?.holder),
            Holder::Vm(vm) => {
                self.get_machine_mut(vm)?.virtual_machine.as_mut().map(|v| &mut v.holder).ok_or_else(|| Error::NotFound(format!("virtual machine {:?}", vm)))
            }
        }
    }

    pub fn get_holder_name(&self, holder: Holder) -> String {
        let name = match holder {
            Holder::Job(job) => self.get_job(job).map(|j| j.get_name().to_string()),
            Holder::Vm(vm) => self.get_machine(vm).map(|m| m.get_name().to_string()),
        };
        name.unwrap_or_else(|_| format!("{:?}", holder))
    }

    pub fn get_machine_name(&self, machine: MachineId) -> String {
        self.get_machine(machine).map(|m| m.get_name().to_string()).unwrap_or_else(|_| format!("{:?}", machine))
    }

    // --- Capacity queries ---

    /// Nominal capacity per unit: own units, granted slices of a hosted VM, or the declared request of an unplaced VM.
    pub fn get_max_resources(&self, machine: MachineId) -> Result<Vec<(ResourceType, f64)>> {
        let machine = self.get_machine(machine)?;
        if let Some(vm) = &machine.virtual_machine {
            if vm.host.is_none() {
                return Ok(vm.holder.get_resource_requests().iter().map(|r| (r.rtype, r.value)).collect());
            }
        }
        machine.get_resources().into_iter().map(|id| self.resources.get(id).map(|r| (r.get_type(), r.get_max_value()))).collect()
    }

    /// Picks the unit of `machine` that should serve `request`.
    ///
    /// Finite requests take the unit with the smallest unreserved capacity that still covers the request. Several
    /// finite requests of one holder may stack on the same unit.
    ///
    /// Infinite requests only consider units with unreserved capacity left and take the largest
    /// `max_value / (1 + dynamic users + VMs using it)`, the first one on ties. Units in `excluded` are skipped
    /// unless no other unit qualifies, so two dedicated cores land on two units whenever the machine has them.
    ///
    /// # Returns
    /// `Error::InsufficientCapacity` if no unit qualifies, reporting the largest unreserved capacity of that type.
    pub fn get_best_fitting(&self, machine: MachineId, request: &ResourceRequest, excluded: &[ResourceId]) -> Result<ResourceId> {
        let mut candidates: Vec<(ResourceId, &Resource)> = Vec::new();
        for id in self.get_machine(machine)?.get_resources() {
            let resource = self.resources.get(id)?;
            if resource.get_type() == request.rtype {
                candidates.push((id, resource));
            }
        }
        let available = candidates.iter().map(|(_, r)| r.get_available_value()).fold(0.0, f64::max);
        let not_found = || Error::InsufficientCapacity { rtype: request.rtype, requested: request.value, available };

        if !request.is_infinite() {
            let mut sorted = candidates.clone();
            sorted.sort_by(|(_, a), (_, b)| a.get_available_value().total_cmp(&b.get_available_value()));
            return sorted.into_iter().find(|(_, r)| r.get_available_value() >= request.value).map(|(id, _)| id).ok_or_else(not_found);
        }

        let usable: Vec<(ResourceId, &Resource)> = candidates.iter().filter(|(_, r)| r.get_available_value() > 0.0).cloned().collect();
        let free: Vec<(ResourceId, &Resource)> = usable.iter().filter(|(id, _)| !excluded.contains(id)).cloned().collect();
        let pool = if free.is_empty() { &usable } else { &free };
        let score = |r: &Resource| r.get_max_value() / (1 + r.get_dynamic_users() + r.vms_using().len()) as f64;

        let mut best: Option<(ResourceId, f64)> = None;
        for (id, resource) in pool {
            let s = score(*resource);
            if best.is_none_or(|(_, b)| s > b) {
                best = Some((*id, s));
            }
        }
        best.map(|(id, _)| id).ok_or_else(not_found)
    }

    /// Whether `holder` fits `machine` once the machine is completely idle.
    ///
    /// Replays the placement `allocate` performs on an idle machine: fixed requests go largest first onto the
    /// tightest unit that still holds them (stacking allowed), dedicated requests then claim a whole non-empty unit,
    /// shared requests only need some non-empty unit of their type. The answer does not depend on the order the
    /// requests were declared in.
    pub fn is_fittable(&self, machine: MachineId, holder: Holder) -> Result<bool> {
        let mut units = self.get_max_resources(machine)?;
        let requests = self.get_holder(holder)?.get_resource_requests();

        let mut fixed: Vec<&ResourceRequest> = requests.iter().filter(|r| !r.is_infinite()).collect();
        fixed.sort_by(|a, b| b.value.total_cmp(&a.value));
        for request in fixed {
            let tightest = units
                .iter_mut()
                .filter(|(rtype, capacity)| *rtype == request.rtype && *capacity >= request.value)
                .min_by(|(_, a), (_, b)| a.total_cmp(b));
            match tightest {
                Some((_, capacity)) => *capacity -= request.value,
                None => return Ok(false),
            }
        }

        for request in requests.iter().filter(|r| r.is_infinite() && !r.shared) {
            let largest = units.iter_mut().filter(|(rtype, capacity)| *rtype == request.rtype && *capacity > 0.0).max_by(|(_, a), (_, b)| a.total_cmp(b));
            match largest {
                Some((_, capacity)) => *capacity = 0.0,
                None => return Ok(false),
            }
        }

        let shared_fit = requests.iter().filter(|r| r.shared).all(|request| units.iter().any(|(rtype, capacity)| *rtype == request.rtype && *capacity > 0.0));
        Ok(shared_fit)
    }

    // --- Allocation ---

    /// Grants every request of `holder` from the pool of `host`, all or nothing.
    ///
    /// Requests are served in [`ResourcesHolder::allocation_order`]. Finite requests may share a unit, dedicated and
    /// shared ones avoid the units earlier requests of the same holder already took while others remain.
    /// On failure every grant made so far is released again.
    ///
    /// # Returns
    /// The running jobs whose fair share changed and need their progress recalculated.
    pub fn allocate(&mut self, host: MachineId, holder: Holder) -> Result<Vec<JobId>> {
        let holder_name = self.get_holder_name(holder);
        self.get_machine(host)?;
        let holder_state = self.get_holder(holder)?;
        if !holder_state.get_grants().is_empty() {
            return Err(Error::AlreadyAllocated { holder: holder_name });
        }

        let order = holder_state.allocation_order();
        let requests: Vec<(usize, ResourceRequest)> = order.into_iter().filter_map(|i| holder_state.get_request(i).map(|r| (i, r))).collect();

        let mut granted: Vec<(usize, Grant)> = Vec::with_capacity(requests.len());
        for (index, request) in requests {
            let excluded: Vec<ResourceId> = granted.iter().map(|(_, g)| g.source).collect();
            let outcome = self.get_best_fitting(host, &request, &excluded).and_then(|id| self.resources.withhold(id, &request, holder));
            match outcome {
                Ok(grant) => granted.push((index, grant)),
                Err(e) => {
                    self.rollback(holder, &granted);
                    log::debug!("Resources allocation for {} on {} failed: {}", holder_name, self.get_machine_name(host), e);
                    return Err(Error::AllocationFailed { holder: holder_name, source: Box::new(e) });
                }
            }
        }

        for (index, grant) in &granted {
            self.resources.get_mut(grant.source)?.add_user(holder);
            self.get_holder_mut(holder)?.set_grant(*index, *grant);
        }
        match holder {
            Holder::Job(job) => {
                self.get_machine_mut(host)?.running_jobs.push(job);
                self.get_job_mut(job)?.host = Some(host);
            }
            Holder::Vm(vm) => {
                self.get_machine_mut(host)?.hosted_vms.push(vm);
                if let Some(state) = self.get_machine_mut(vm)?.virtual_machine.as_mut() {
                    state.host = Some(host);
                }
            }
        }

        let sources: Vec<ResourceId> = granted.iter().map(|(_, g)| g.source).collect();
        Ok(self.get_dynamic_jobs(&sources, holder))
    }

    /// Releases every grant of `holder` back to `host`.
    ///
    /// # Returns
    /// The running jobs whose fair share changed, `Error::NotAllocated` if `holder` does not run on `host`.
    pub fn free(&mut self, host: MachineId, holder: Holder) -> Result<Vec<JobId>> {
        let machine = self.get_machine(host)?;
        let registered = match holder {
            Holder::Job(job) => machine.running_jobs.contains(&job),
            Holder::Vm(vm) => machine.hosted_vms.contains(&vm),
        };
        if !registered {
            return Err(Error::NotAllocated { holder: self.get_holder_name(holder), machine: self.get_machine_name(host) });
        }
        if let Holder::Vm(vm) = holder {
            if !self.get_machine(vm)?.is_idle() {
                return Err(Error::MachineBusy { machine: self.get_machine_name(vm) });
            }
        }

        let grants = self.get_holder_mut(holder)?.take_grants();
        for grant in &grants {
            self.resources.release(grant, holder, self.release_epsilon)?;
            self.resources.get_mut(grant.source)?.del_user(holder);
        }

        let machine = self.get_machine_mut(host)?;
        match holder {
            Holder::Job(job) => {
                if let Some(pos) = machine.running_jobs.iter().position(|j| *j == job) {
                    machine.running_jobs.remove(pos);
                }
            }
            Holder::Vm(vm) => {
                if let Some(pos) = machine.hosted_vms.iter().position(|v| *v == vm) {
                    machine.hosted_vms.remove(pos);
                }
                if let Some(state) = self.get_machine_mut(vm)?.virtual_machine.as_mut() {
                    state.host = None;
                }
            }
        }

        let sources: Vec<ResourceId> = grants.iter().map(|g| g.source).collect();
        Ok(self.get_dynamic_jobs(&sources, holder))
    }

    fn rollback(&mut self, holder: Holder, granted: &[(usize, Grant)]) {
        for (_, grant) in granted.iter().rev() {
            if let Err(e) = self.resources.release(grant, holder, self.release_epsilon) {
                log::error!("Rollback of a grant for {} failed: {}", self.get_holder_name(holder), e);
            }
        }
    }

    /// Jobs holding a shared grant on any of `sources`, except `exclude`, in order of first use.
    fn get_dynamic_jobs(&self, sources: &[ResourceId], exclude: Holder) -> Vec<JobId> {
        let mut jobs: Vec<JobId> = Vec::new();
        for source in sources {
            let Ok(resource) = self.resources.get(*source) else { continue };
            for job_id in resource.jobs_using() {
                if Holder::Job(job_id) == exclude || jobs.contains(&job_id) {
                    continue;
                }
                let shares = self.jobs.get(job_id).is_some_and(|job| job.holder.get_grants().iter().any(|g| g.is_shared() && g.source == *source));
                if shares {
                    jobs.push(job_id);
                }
            }
        }
        jobs
    }

    // --- VM sizing ---

    /// Requests of the smallest virtual machine every job in `jobs` fits into.
    ///
    /// Cores: the largest per-job core count, each an infinite request (dedicated with `own_cores`).
    /// RAM: the largest per-job total. GPUs: the largest per-job count, sized to the largest GPU request.
    pub fn get_minimal_vm_requests(&self, jobs: &[JobId], own_cores: bool) -> Result<Vec<ResourceRequest>> {
        let mut cores = 0;
        let mut ram: f64 = 0.0;
        let mut gpus = 0;
        let mut gpu_size: f64 = 0.0;
        for job in jobs {
            let requests = self.get_job(*job)?.get_resource_requests();
            cores = cores.max(requests.iter().filter(|r| r.rtype == ResourceType::CpuCore).count());
            ram = ram.max(requests.iter().filter(|r| r.rtype == ResourceType::Ram).map(|r| r.value).sum());
            let job_gpus: Vec<&ResourceRequest> = requests.iter().filter(|r| r.rtype == ResourceType::Gpu).collect();
            gpus = gpus.max(job_gpus.len());
            gpu_size = job_gpus.iter().map(|r| r.value).fold(gpu_size, f64::max);
        }

        let mut requests = Vec::new();
        for _ in 0..cores {
            requests.push(if own_cores { ResourceRequest::dedicated(ResourceType::CpuCore) } else { ResourceRequest::shared(ResourceType::CpuCore) });
        }
        if ram > 0.0 {
            requests.push(ResourceRequest::new(ResourceType::Ram, ram, ram == INF)?);
        }
        for _ in 0..gpus {
            requests.push(ResourceRequest::new(ResourceType::Gpu, gpu_size, gpu_size == INF)?);
        }
        Ok(requests)
    }
}
