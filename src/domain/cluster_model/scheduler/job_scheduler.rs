use std::collections::VecDeque;

use crate::domain::cluster_model::cluster_model::ClusterModel;
use crate::domain::cluster_model::job::job::JobId;
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::cluster_model::resource::resources_holder::Holder;
use crate::domain::cluster_model::scheduler::scheduler::Scheduler;
use crate::domain::simulator::event::EventKind;
use crate::domain::simulator::event_queue::EventQueue;
use crate::domain::simulator::notification::{Notification, SIMULATION_START};
use crate::error::{Error, Result};

/// FIFO job queue of one machine.
///
/// Whenever a job starts or finishes on the machine (or the machine, being a VM, starts) the head of the queue is
/// probed with a `TryJobStart`. While a probe is pending the scheduler ignores notifications. With `autofree`, a
/// virtual machine whose queue ran empty and that has nothing left running ends itself.
#[derive(Debug)]
pub struct JobSchedulerSimple {
    machine: MachineId,
    queue: VecDeque<JobId>,
    autofree: bool,
    suspended: bool,
    finished: bool,
}

impl JobSchedulerSimple {
    pub fn new(machine: MachineId, autofree: bool) -> Self {
        JobSchedulerSimple { machine, queue: VecDeque::new(), autofree, suspended: false, finished: false }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn try_start_next(&mut self, queue: &mut EventQueue) -> Result<()> {
        if let Some(job) = self.queue.front() {
            queue.add_event(queue.now(), EventKind::TryJobStart { job: *job, host: self.machine })?;
            self.suspended = true;
        }
        Ok(())
    }

    /// Ends the virtual machine when nothing is queued or running anymore.
    ///
    /// # Returns
    /// Whether a `VmEnd` was scheduled.
    fn try_auto_free(&mut self, model: &ClusterModel, queue: &mut EventQueue) -> Result<bool> {
        if !self.autofree || !self.queue.is_empty() {
            return Ok(false);
        }
        let machine = model.get_machine(self.machine)?;
        let Some(host) = machine.get_host() else {
            return Ok(false);
        };
        if !machine.is_idle() {
            return Ok(false);
        }

        queue.add_event(queue.now(), EventKind::VmEnd { vm: self.machine, host })?;
        self.finished = true;
        log::info!("Virtual machine {} ran out of jobs and is released at {}.", machine.get_name(), queue.now());
        Ok(true)
    }
}

impl Scheduler for JobSchedulerSimple {
    fn get_machine(&self) -> MachineId {
        self.machine
    }

    fn schedule(&mut self, entity: Holder, model: &ClusterModel, _pending_jobs: &[JobId]) -> Result<()> {
        let Holder::Job(job) = entity else {
            return Err(Error::UnsupportedEntity { machine: model.get_machine_name(self.machine), entity: model.get_holder_name(entity) });
        };
        if self.finished {
            return Err(Error::SchedulerFinished { machine: model.get_machine_name(self.machine) });
        }
        if !model.is_fittable(self.machine, entity)? {
            log::warn!("Job {} rejected: it can never be allocated on {}.", model.get_holder_name(entity), model.get_machine_name(self.machine));
            return Err(Error::NeverFits { holder: model.get_holder_name(entity), machine: model.get_machine_name(self.machine) });
        }

        self.queue.push_back(job);
        Ok(())
    }

    fn notify(&mut self, notification: &Notification, model: &ClusterModel, queue: &mut EventQueue) -> Result<()> {
        if self.finished || self.suspended {
            return Ok(());
        }

        match notification {
            Notification::JobFinish { host, .. } if *host == self.machine => {
                if self.try_auto_free(model, queue)? {
                    return Ok(());
                }
                self.try_start_next(queue)
            }
            Notification::JobStart { host, .. } if *host == self.machine => self.try_start_next(queue),
            Notification::VmStart { vm, .. } if *vm == self.machine => self.try_start_next(queue),
            Notification::Other { message, .. } if message == SIMULATION_START => self.try_start_next(queue),
            _ => Ok(()),
        }
    }

    fn on_probe_finished(&mut self, allocated: bool) -> Result<()> {
        self.suspended = false;
        if allocated {
            self.queue.pop_front();
        }
        Ok(())
    }

    fn get_queued(&self) -> Vec<Holder> {
        self.queue.iter().map(|job| Holder::Job(*job)).collect()
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
