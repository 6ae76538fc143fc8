use std::collections::VecDeque;
use std::fmt::Debug;

use crate::domain::cluster_model::cluster_model::ClusterModel;
use crate::domain::cluster_model::job::job::JobId;
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::cluster_model::resource::resources_holder::Holder;
use crate::domain::cluster_model::scheduler::scheduler::Scheduler;
use crate::domain::simulator::event::EventKind;
use crate::domain::simulator::event_queue::EventQueue;
use crate::domain::simulator::notification::{Notification, SIMULATION_START, VM_SCHEDULE};
use crate::error::{Error, Result};

/// Order in which a VM scheduler offers its virtual machines to the host.
pub trait VmQueue: Debug {
    fn push(&mut self, vm: MachineId, model: &ClusterModel, pending_jobs: &[JobId]) -> Result<()>;

    /// Next VM to try, without removing it.
    fn head(&mut self) -> Result<Option<MachineId>>;

    /// Removes the VM returned by the last `head`.
    fn pop_front(&mut self) -> Result<Option<MachineId>>;

    fn queued(&self) -> Vec<MachineId>;
}

#[derive(Debug, Default)]
pub struct FifoVmQueue {
    vms: VecDeque<MachineId>,
}

impl VmQueue for FifoVmQueue {
    fn push(&mut self, vm: MachineId, _model: &ClusterModel, _pending_jobs: &[JobId]) -> Result<()> {
        self.vms.push_back(vm);
        Ok(())
    }

    fn head(&mut self) -> Result<Option<MachineId>> {
        Ok(self.vms.front().copied())
    }

    fn pop_front(&mut self) -> Result<Option<MachineId>> {
        Ok(self.vms.pop_front())
    }

    fn queued(&self) -> Vec<MachineId> {
        self.vms.iter().copied().collect()
    }
}

/// Queues virtual machines for one physical machine and starts them one probe (`TryVmStart`) at a time.
#[derive(Debug)]
pub struct VmSchedulerSimple<Q: VmQueue = FifoVmQueue> {
    machine: MachineId,
    queue: Q,
    suspended: bool,
}

impl VmSchedulerSimple<FifoVmQueue> {
    pub fn new(machine: MachineId) -> Self {
        Self::with_queue(machine, FifoVmQueue::default())
    }
}

impl<Q: VmQueue> VmSchedulerSimple<Q> {
    pub fn with_queue(machine: MachineId, queue: Q) -> Self {
        VmSchedulerSimple { machine, queue, suspended: false }
    }

    pub fn get_queue(&self) -> &Q {
        &self.queue
    }

    pub fn get_queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    fn try_allocate(&mut self, queue: &mut EventQueue) -> Result<()> {
        if let Some(vm) = self.queue.head()? {
            queue.add_event(queue.now(), EventKind::TryVmStart { vm, host: self.machine })?;
            self.suspended = true;
        }
        Ok(())
    }
}

impl<Q: VmQueue> Scheduler for VmSchedulerSimple<Q> {
    fn get_machine(&self) -> MachineId {
        self.machine
    }

    fn schedule(&mut self, entity: Holder, model: &ClusterModel, pending_jobs: &[JobId]) -> Result<()> {
        let Holder::Vm(vm) = entity else {
            return Err(Error::UnsupportedEntity { machine: model.get_machine_name(self.machine), entity: model.get_holder_name(entity) });
        };
        if !model.is_fittable(self.machine, entity)? {
            log::warn!("Virtual machine {} rejected: it can never be allocated on {}.", model.get_holder_name(entity), model.get_machine_name(self.machine));
            return Err(Error::NeverFits { holder: model.get_holder_name(entity), machine: model.get_machine_name(self.machine) });
        }
        self.queue.push(vm, model, pending_jobs)
    }

    fn notify(&mut self, notification: &Notification, _model: &ClusterModel, queue: &mut EventQueue) -> Result<()> {
        if self.suspended {
            return Ok(());
        }

        match notification {
            Notification::VmStart { host, .. } | Notification::VmEnd { host, .. } if *host == self.machine => self.try_allocate(queue),
            Notification::Other { message, .. } if message == SIMULATION_START || message == VM_SCHEDULE => self.try_allocate(queue),
            _ => Ok(()),
        }
    }

    fn on_probe_finished(&mut self, allocated: bool) -> Result<()> {
        self.suspended = false;
        if allocated {
            self.queue.pop_front()?;
        }
        Ok(())
    }

    fn get_queued(&self) -> Vec<Holder> {
        self.queue.queued().into_iter().map(Holder::Vm).collect()
    }
}
