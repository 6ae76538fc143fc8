use crate::api::infrastructure_dto::InfrastructureDto;
use crate::domain::cluster_model::cluster_model::ClusterModel;
use crate::domain::cluster_model::job::job::{JobId, JobPriority, JobState, Operations};
use crate::domain::cluster_model::machine::infrastructure::Infrastructure;
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::cluster_model::placement::placement_policy::VmPlacementPolicy;
use crate::domain::cluster_model::resource::resource::{Resource, ResourceType};
use crate::domain::cluster_model::resource::resource_request::ResourceRequest;
use crate::domain::cluster_model::resource::resources_holder::Holder;
use crate::domain::cluster_model::scheduler::job_scheduler::JobSchedulerSimple;
use crate::domain::cluster_model::scheduler::scheduler::Scheduler;
use crate::domain::cluster_model::scheduler::scheduler_store::{SchedulerId, SchedulerStore};
use crate::domain::simulator::config::SimulationConfig;
use crate::domain::simulator::event::EventKind;
use crate::domain::simulator::event_queue::{EventId, EventQueue, ScheduledEvent};
use crate::domain::simulator::notification::Notification;
use crate::error::{Error, Result};

/// Owns the whole state of one simulation: clock and pending events, cluster model, schedulers and infrastructure.
///
/// Everything that mutates the simulation goes through here, so recalculations of jobs sharing a resource are
/// always scheduled as events instead of being applied in place.
#[derive(Debug)]
pub struct SimulationContext {
    config: SimulationConfig,
    pub(crate) queue: EventQueue,
    pub(crate) model: ClusterModel,
    pub(crate) schedulers: SchedulerStore,
    pub(crate) infrastructure: Option<Infrastructure>,
}

impl Default for SimulationContext {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl SimulationContext {
    pub fn new(config: SimulationConfig) -> Self {
        SimulationContext {
            queue: EventQueue::new(config.history_limit),
            model: ClusterModel::new(config.release_epsilon),
            schedulers: SchedulerStore::new(),
            infrastructure: None,
            config,
        }
    }

    pub fn now(&self) -> f64 {
        self.queue.now()
    }

    pub fn get_config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn get_model(&self) -> &ClusterModel {
        &self.model
    }

    pub fn get_queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn get_schedulers(&self) -> &SchedulerStore {
        &self.schedulers
    }

    pub fn get_infrastructure(&self) -> Option<&Infrastructure> {
        self.infrastructure.as_ref()
    }

    pub fn get_history(&self) -> Vec<&ScheduledEvent> {
        self.queue.get_history().iter().collect()
    }

    // --- Events ---

    pub fn add_event(&mut self, time: f64, kind: EventKind) -> Result<EventId> {
        self.queue.add_event(time, kind)
    }

    pub fn add_event_with_priority(&mut self, time: f64, kind: EventKind, priority: i32) -> Result<EventId> {
        self.queue.add_event_with_priority(time, kind, priority)
    }

    pub fn remove_event(&mut self, id: EventId) -> Result<ScheduledEvent> {
        self.queue.remove_event(id)
    }

    // --- Construction ---

    pub fn add_machine(&mut self, name: &str, resources: Vec<Resource>) -> MachineId {
        self.model.add_machine(name, resources)
    }

    pub fn add_virtual_machine(&mut self, name: &str, requests: Vec<ResourceRequest>) -> MachineId {
        self.model.add_virtual_machine(name, requests)
    }

    pub fn add_job(&mut self, operations: impl Into<Operations>, requests: Vec<ResourceRequest>, name: Option<&str>) -> Result<JobId> {
        self.model.add_job(name, operations.into(), requests)
    }

    pub fn set_job_priority(&mut self, job: JobId, priority: JobPriority) -> Result<()> {
        self.model.get_job_mut(job)?.set_priority(priority);
        Ok(())
    }

    /// Creates one physical machine per entry: its cores, a single RAM unit and its GPUs.
    pub fn add_machines_from_dto(&mut self, dto: &InfrastructureDto) -> Vec<MachineId> {
        dto.machines
            .iter()
            .map(|machine| {
                let mut resources: Vec<Resource> = (0..machine.cores).map(|_| Resource::new(ResourceType::CpuCore, machine.core_freq)).collect();
                resources.push(Resource::new(ResourceType::Ram, machine.ram));
                resources.extend(machine.gpus.iter().map(|gpu| Resource::with_freq(ResourceType::Gpu, gpu.cuda_cores, gpu.freq)));
                log::debug!("Adding machine {} with {} cores, {} RAM and {} GPUs.", machine.name, machine.cores, machine.ram, machine.gpus.len());
                self.add_machine(&machine.name, resources)
            })
            .collect()
    }

    // --- Schedulers ---

    /// Installs the scheduler that starts jobs on `machine`, replacing a previous one.
    pub fn set_job_scheduler<S: Scheduler + 'static>(&mut self, machine: MachineId, scheduler: S) -> Result<SchedulerId> {
        self.model.get_machine(machine)?;
        let id = self.schedulers.add(Box::new(scheduler));
        if let Some(previous) = self.model.get_machine_mut(machine)?.job_scheduler.replace(id) {
            self.schedulers.detach(previous);
        }
        Ok(id)
    }

    /// Installs the scheduler that starts virtual machines on `machine`, replacing a previous one.
    pub fn set_vm_scheduler<S: Scheduler + 'static>(&mut self, machine: MachineId, scheduler: S) -> Result<SchedulerId> {
        self.model.get_machine(machine)?;
        let id = self.schedulers.add(Box::new(scheduler));
        if let Some(previous) = self.model.get_machine_mut(machine)?.vm_scheduler.replace(id) {
            self.schedulers.detach(previous);
        }
        Ok(id)
    }

    /// Queues `job` in the job scheduler of `machine`.
    pub fn schedule_job(&mut self, job: JobId, machine: MachineId) -> Result<()> {
        let id = self.model.get_machine(machine)?.get_job_scheduler().ok_or_else(|| Error::NoScheduler { machine: self.model.get_machine_name(machine), kind: "job" })?;
        self.schedulers.schedule(id, Holder::Job(job), &self.model, &[])
    }

    /// Queues `vm` in the VM scheduler of `machine`.
    pub fn schedule_vm(&mut self, vm: MachineId, machine: MachineId) -> Result<()> {
        let id = self.model.get_machine(machine)?.get_vm_scheduler().ok_or_else(|| Error::NoScheduler { machine: self.model.get_machine_name(machine), kind: "VM" })?;
        let pending = self.pending_jobs(vm)?;
        self.schedulers.schedule(id, Holder::Vm(vm), &self.model, &pending)
    }

    /// Jobs waiting in the job scheduler of `vm`, empty if it has none.
    pub fn pending_jobs(&self, vm: MachineId) -> Result<Vec<JobId>> {
        match self.model.get_machine(vm)?.get_job_scheduler() {
            Some(id) => self.schedulers.get_queued_jobs(id),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) fn notify_schedulers(&mut self, notification: &Notification) -> Result<()> {
        self.schedulers.notify_all(notification, &self.model, &mut self.queue)
    }

    /// Reports the outcome of a `TryJobStart` / `TryVmStart` to the scheduler of `host` that asked for it.
    pub(crate) fn probe_finished(&mut self, host: MachineId, entity: Holder, allocated: bool) -> Result<()> {
        let machine = self.model.get_machine(host)?;
        let scheduler = match entity {
            Holder::Job(_) => machine.get_job_scheduler(),
            Holder::Vm(_) => machine.get_vm_scheduler(),
        };
        match scheduler {
            Some(id) => self.schedulers.get_mut(id)?.on_probe_finished(allocated),
            None => {
                log::debug!("Probe for {} on {} has no scheduler to report to.", self.model.get_holder_name(entity), machine.get_name());
                Ok(())
            }
        }
    }

    // --- Infrastructure ---

    pub fn set_infrastructure<P: VmPlacementPolicy + 'static>(&mut self, machines: Vec<MachineId>, policy: P) {
        self.infrastructure = Some(Infrastructure::new(machines, Box::new(policy)));
    }

    /// Places `vm` on one of the infrastructure's machines through its placement policy.
    ///
    /// # Returns
    /// The chosen machine.
    pub fn schedule_vm_on_infrastructure(&mut self, vm: MachineId) -> Result<MachineId> {
        let pending = self.pending_jobs(vm)?;
        let infrastructure = self.infrastructure.as_mut().ok_or_else(|| Error::NotFound("infrastructure".to_string()))?;
        let machine = infrastructure.policy.place_vm(vm, &self.model, &mut self.schedulers, &pending)?;
        infrastructure.known_vms.insert(vm);
        log::info!("Virtual machine {} placed on {}.", self.model.get_machine_name(vm), self.model.get_machine_name(machine));
        Ok(machine)
    }

    /// Queues `job` on a virtual machine that was placed through the infrastructure.
    pub fn schedule_job_on_vm(&mut self, job: JobId, vm: MachineId) -> Result<()> {
        let known = self.infrastructure.as_ref().is_some_and(|i| i.knows_vm(vm));
        if !known {
            return Err(Error::UnknownVm(self.model.get_machine_name(vm)));
        }
        self.schedule_job(job, vm)
    }

    /// Creates a virtual machine just big enough for each of `jobs`, with an autofree job scheduler holding them.
    ///
    /// With `own_cores` the VM asks for dedicated cores, otherwise it shares the host's cores.
    pub fn add_minimal_vm(&mut self, name: &str, jobs: &[JobId], own_cores: bool) -> Result<MachineId> {
        let requests = self.model.get_minimal_vm_requests(jobs, own_cores)?;
        let vm = self.add_virtual_machine(name, requests);
        self.set_job_scheduler(vm, JobSchedulerSimple::new(vm, true))?;
        for job in jobs {
            self.schedule_job(*job, vm)?;
        }
        Ok(vm)
    }

    // --- Allocation ---

    /// Allocates `holder` on `host` and schedules recalculations for the jobs whose share changed.
    pub fn allocate(&mut self, host: MachineId, holder: Holder) -> Result<()> {
        let affected = self.model.allocate(host, holder)?;
        self.schedule_recalculations(&affected)
    }

    /// Frees `holder` from `host` and schedules recalculations for the jobs whose share changed.
    pub fn free(&mut self, host: MachineId, holder: Holder) -> Result<()> {
        let affected = self.model.free(host, holder)?;
        self.schedule_recalculations(&affected)
    }

    fn schedule_recalculations(&mut self, jobs: &[JobId]) -> Result<()> {
        let now = self.now();
        for job in jobs {
            let state = self.model.get_job(*job)?;
            let started = state.get_state() == JobState::Running && !state.get_progress_log().is_empty();
            if !started || state.get_max_operations_left() <= self.config.progress_epsilon {
                continue;
            }
            if let Some(host) = state.get_host() {
                self.queue.add_event(now, EventKind::JobRecalculate { job: *job, host })?;
            }
        }
        Ok(())
    }

    /// Records the job's current speed and schedules its `JobFinish`.
    pub(crate) fn schedule_finish(&mut self, job: JobId, host: MachineId) -> Result<()> {
        let now = self.now();
        let state = self.model.get_job(job)?;
        let speed = state.get_current_speed(self.model.get_resources())?;
        let exec_time = state.calculate_exec_time(&speed)?;
        log::debug!("{} runs at {:?} from {}, finishing in {}.", state.get_name(), speed, now, exec_time);

        let finish = self.queue.add_event(now + exec_time, EventKind::JobFinish { job, host })?;
        let state = self.model.get_job_mut(job)?;
        state.update(now, speed);
        state.predicted_finish = Some(finish);
        Ok(())
    }
}
