use slotmap::{SlotMap, new_key_type};

use crate::domain::cluster_model::cluster_model::ClusterModel;
use crate::domain::cluster_model::job::job::JobId;
use crate::domain::cluster_model::resource::resources_holder::Holder;
use crate::domain::cluster_model::scheduler::scheduler::Scheduler;
use crate::domain::simulator::event_queue::EventQueue;
use crate::domain::simulator::notification::Notification;
use crate::error::{Error, Result};

new_key_type! {
    pub struct SchedulerId;
}

/// All schedulers of a simulation. Active schedulers are notified in the order they were added.
#[derive(Debug, Default)]
pub struct SchedulerStore {
    slots: SlotMap<SchedulerId, Box<dyn Scheduler>>,
    active: Vec<SchedulerId>,
    detached: Vec<SchedulerId>,
}

impl SchedulerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, scheduler: Box<dyn Scheduler>) -> SchedulerId {
        let id = self.slots.insert(scheduler);
        self.active.push(id);
        id
    }

    pub fn get(&self, id: SchedulerId) -> Result<&dyn Scheduler> {
        self.slots.get(id).map(|s| s.as_ref()).ok_or_else(|| Error::NotFound(format!("scheduler {:?}", id)))
    }

    pub(crate) fn get_mut(&mut self, id: SchedulerId) -> Result<&mut Box<dyn Scheduler>> {
        self.slots.get_mut(id).ok_or_else(|| Error::NotFound(format!("scheduler {:?}", id)))
    }

    /// Stops notifying `id` from the next dispatch on.
    pub(crate) fn detach(&mut self, id: SchedulerId) {
        self.detached.push(id);
    }

    pub fn is_active(&self, id: SchedulerId) -> bool {
        self.active.contains(&id) && !self.detached.contains(&id)
    }

    pub fn schedule(&mut self, id: SchedulerId, entity: Holder, model: &ClusterModel, pending_jobs: &[JobId]) -> Result<()> {
        self.get_mut(id)?.schedule(entity, model, pending_jobs)
    }

    /// Jobs queued in scheduler `id`, in queue order.
    pub fn get_queued_jobs(&self, id: SchedulerId) -> Result<Vec<JobId>> {
        let queued = self.get(id)?.get_queued();
        Ok(queued.into_iter().filter_map(|h| if let Holder::Job(job) = h { Some(job) } else { None }).collect())
    }

    pub(crate) fn notify_all(&mut self, notification: &Notification, model: &ClusterModel, queue: &mut EventQueue) -> Result<()> {
        let detached = std::mem::take(&mut self.detached);
        self.active.retain(|id| !detached.contains(id));

        for id in self.active.clone() {
            let scheduler = self.get_mut(id)?;
            scheduler.notify(notification, model, queue)?;
            if scheduler.is_finished() {
                self.detached.push(id);
            }
        }
        Ok(())
    }
}
