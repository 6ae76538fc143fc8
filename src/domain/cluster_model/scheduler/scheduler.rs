use std::fmt::Debug;

use crate::domain::cluster_model::cluster_model::ClusterModel;
use crate::domain::cluster_model::job::job::JobId;
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::cluster_model::resource::resources_holder::Holder;
use crate::domain::simulator::event_queue::EventQueue;
use crate::domain::simulator::notification::Notification;
use crate::error::Result;

/// Admission control of one machine: queues jobs or virtual machines and starts them through probing events.
///
/// Schedulers only read the cluster model and act by adding events to the queue. The outcome of a probe
/// (`TryJobStart` / `TryVmStart`) comes back through [`Scheduler::on_probe_finished`].
pub trait Scheduler: Debug {
    fn get_machine(&self) -> MachineId;

    /// Queues `entity`. `pending_jobs` are the jobs already queued inside `entity` when it is a virtual machine.
    ///
    /// # Returns
    /// `Error::NeverFits` if `entity` does not fit even the idle machine.
    fn schedule(&mut self, entity: Holder, model: &ClusterModel, pending_jobs: &[JobId]) -> Result<()>;

    fn notify(&mut self, notification: &Notification, model: &ClusterModel, queue: &mut EventQueue) -> Result<()>;

    fn on_probe_finished(&mut self, allocated: bool) -> Result<()>;

    fn get_queued(&self) -> Vec<Holder>;

    /// A finished scheduler is detached and ignores further notifications.
    fn is_finished(&self) -> bool {
        false
    }
}
