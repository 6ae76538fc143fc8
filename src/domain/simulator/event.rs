use crate::domain::cluster_model::job::job::{JobId, JobState};
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::cluster_model::resource::resources_holder::Holder;
use crate::domain::simulator::notification::{Notification, VM_SCHEDULE};
use crate::domain::simulator::simulation_context::SimulationContext;
use crate::error::{Error, Result};

pub const JOB_START_PRIORITY: i32 = 0;
pub const JOB_FINISH_PRIORITY: i32 = 80;
pub const JOB_RECALCULATE_PRIORITY: i32 = 100;
pub const VM_START_PRIORITY: i32 = 10;
pub const VM_END_PRIORITY: i32 = 20;
pub const VM_SCHEDULE_PRIORITY: i32 = 0;

/// Where a `VmSchedule` event submits its virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleTarget {
    /// Through the placement policy of the infrastructure.
    Infrastructure,
    /// Straight to the VM scheduler of a machine.
    Machine(MachineId),
}

/// Everything that can happen at a point in simulated time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    JobStart { job: JobId, host: MachineId },
    /// Like `JobStart`, but a failed allocation is reported to the host's job scheduler instead of failing the run.
    TryJobStart { job: JobId, host: MachineId },
    JobFinish { job: JobId, host: MachineId },
    JobRecalculate { job: JobId, host: MachineId },
    VmStart { vm: MachineId, host: MachineId },
    /// Like `VmStart`, reporting the outcome to the host's VM scheduler.
    TryVmStart { vm: MachineId, host: MachineId },
    VmEnd { vm: MachineId, host: MachineId },
    VmSchedule { vm: MachineId, target: ScheduleTarget },
}

impl EventKind {
    /// Tie-break class at equal times, higher runs first.
    pub fn default_priority(&self) -> i32 {
        match self {
            EventKind::JobStart { .. } | EventKind::TryJobStart { .. } => JOB_START_PRIORITY,
            EventKind::JobFinish { .. } => JOB_FINISH_PRIORITY,
            EventKind::JobRecalculate { .. } => JOB_RECALCULATE_PRIORITY,
            EventKind::VmStart { .. } | EventKind::TryVmStart { .. } => VM_START_PRIORITY,
            EventKind::VmEnd { .. } => VM_END_PRIORITY,
            EventKind::VmSchedule { .. } => VM_SCHEDULE_PRIORITY,
        }
    }

    pub fn get_name(&self) -> &'static str {
        match self {
            EventKind::JobStart { .. } => "JobStart",
            EventKind::TryJobStart { .. } => "TryJobStart",
            EventKind::JobFinish { .. } => "JobFinish",
            EventKind::JobRecalculate { .. } => "JobRecalculate",
            EventKind::VmStart { .. } => "VMStart",
            EventKind::TryVmStart { .. } => "TryVMStart",
            EventKind::VmEnd { .. } => "VMEnd",
            EventKind::VmSchedule { .. } => "VMSchedule",
        }
    }
}

impl SimulationContext {
    /// Applies `kind` to the simulation state at the current time.
    ///
    /// # Returns
    /// What to broadcast afterwards, `None` when nothing observable happened.
    pub(crate) fn execute(&mut self, kind: &EventKind) -> Result<Option<Notification>> {
        match *kind {
            EventKind::JobStart { job, host } => {
                self.start_job(job, host)?;
                Ok(Some(Notification::JobStart { job, host }))
            }
            EventKind::TryJobStart { job, host } => match self.start_job(job, host) {
                Ok(()) => {
                    self.probe_finished(host, Holder::Job(job), true)?;
                    Ok(Some(Notification::JobStart { job, host }))
                }
                Err(e) if e.is_allocation_failure() => {
                    log::debug!("{} does not fit {} at {} yet.", self.model.get_holder_name(Holder::Job(job)), self.model.get_machine_name(host), self.now());
                    self.probe_finished(host, Holder::Job(job), false)?;
                    Ok(None)
                }
                Err(e) => Err(e),
            },
            EventKind::JobFinish { job, host } => {
                let now = self.now();
                let epsilon = self.get_config().progress_epsilon;
                self.model.get_job_mut(job)?.register_progress(now, epsilon)?;
                self.free(host, Holder::Job(job))?;

                let host_name = self.model.get_machine_name(host);
                let state = self.model.get_job_mut(job)?;
                state.state = JobState::Finished;
                state.predicted_finish = None;
                log::debug!("{} finished on {} at {}.", state.get_name(), host_name, now);
                Ok(Some(Notification::JobFinish { job, host }))
            }
            EventKind::JobRecalculate { job, host } => {
                if self.model.get_job(job)?.get_state() != JobState::Running {
                    return Ok(None);
                }
                let now = self.now();
                let epsilon = self.get_config().progress_epsilon;
                let state = self.model.get_job_mut(job)?;
                state.register_progress(now, epsilon)?;

                if let Some(finish) = state.predicted_finish.take() {
                    match self.queue.remove_event(finish) {
                        Ok(_) | Err(Error::AlreadyExecuted(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
                self.schedule_finish(job, host)?;
                Ok(Some(Notification::JobRecalculate { job, host }))
            }
            EventKind::VmStart { vm, host } => {
                self.allocate(host, Holder::Vm(vm))?;
                log::debug!("{} started on {} at {}.", self.model.get_machine_name(vm), self.model.get_machine_name(host), self.now());
                Ok(Some(Notification::VmStart { vm, host }))
            }
            EventKind::TryVmStart { vm, host } => match self.allocate(host, Holder::Vm(vm)) {
                Ok(()) => {
                    self.probe_finished(host, Holder::Vm(vm), true)?;
                    Ok(Some(Notification::VmStart { vm, host }))
                }
                Err(e) if e.is_allocation_failure() => {
                    self.probe_finished(host, Holder::Vm(vm), false)?;
                    Ok(None)
                }
                Err(e) => Err(e),
            },
            EventKind::VmEnd { vm, host } => {
                let current = self.model.get_machine(vm)?.get_host();
                if current != Some(host) {
                    return Err(Error::WrongHost {
                        vm: self.model.get_machine_name(vm),
                        host: current.map(|h| self.model.get_machine_name(h)).unwrap_or_else(|| "none".to_string()),
                        requested: self.model.get_machine_name(host),
                    });
                }
                self.free(host, Holder::Vm(vm))?;
                log::debug!("{} ended on {} at {}.", self.model.get_machine_name(vm), self.model.get_machine_name(host), self.now());
                Ok(Some(Notification::VmEnd { vm, host }))
            }
            EventKind::VmSchedule { vm, target } => {
                match target {
                    ScheduleTarget::Infrastructure => {
                        self.schedule_vm_on_infrastructure(vm)?;
                    }
                    ScheduleTarget::Machine(machine) => self.schedule_vm(vm, machine)?,
                }
                Ok(Some(Notification::Other { message: VM_SCHEDULE.to_string(), vm: Some(vm) }))
            }
        }
    }

    /// Allocates the job on `host` and sets it running.
    fn start_job(&mut self, job: JobId, host: MachineId) -> Result<()> {
        self.allocate(host, Holder::Job(job))?;
        self.model.get_job_mut(job)?.state = JobState::Running;
        if let Err(e) = self.schedule_finish(job, host) {
            self.model.get_job_mut(job)?.state = JobState::Created;
            self.free(host, Holder::Job(job))?;
            return Err(e);
        }
        Ok(())
    }
}
