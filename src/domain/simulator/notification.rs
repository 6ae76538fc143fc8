use slotmap::{SlotMap, new_key_type};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::domain::cluster_model::job::job::JobId;
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::simulator::simulation_context::SimulationContext;

pub const SIMULATION_START: &str = "SimulationStart";
pub const VM_SCHEDULE: &str = "VMSchedule";

new_key_type! {
    pub struct ListenerId;
}

/// What happened, broadcast after an event executed.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    JobStart { job: JobId, host: MachineId },
    JobFinish { job: JobId, host: MachineId },
    JobRecalculate { job: JobId, host: MachineId },
    VmStart { vm: MachineId, host: MachineId },
    VmEnd { vm: MachineId, host: MachineId },
    /// Synthetic notifications such as [`SIMULATION_START`] and [`VM_SCHEDULE`].
    Other { message: String, vm: Option<MachineId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationType {
    JobStart,
    JobFinish,
    JobRecalculate,
    VmStart,
    VmEnd,
    Other,
}

impl Notification {
    pub fn other(message: &str) -> Self {
        Notification::Other { message: message.to_string(), vm: None }
    }

    pub fn get_type(&self) -> NotificationType {
        match self {
            Notification::JobStart { .. } => NotificationType::JobStart,
            Notification::JobFinish { .. } => NotificationType::JobFinish,
            Notification::JobRecalculate { .. } => NotificationType::JobRecalculate,
            Notification::VmStart { .. } => NotificationType::VmStart,
            Notification::VmEnd { .. } => NotificationType::VmEnd,
            Notification::Other { .. } => NotificationType::Other,
        }
    }

    pub fn get_job(&self) -> Option<JobId> {
        match self {
            Notification::JobStart { job, .. } | Notification::JobFinish { job, .. } | Notification::JobRecalculate { job, .. } => Some(*job),
            _ => None,
        }
    }

    pub fn get_vm(&self) -> Option<MachineId> {
        match self {
            Notification::VmStart { vm, .. } | Notification::VmEnd { vm, .. } => Some(*vm),
            Notification::Other { vm, .. } => *vm,
            _ => None,
        }
    }

    pub fn get_host(&self) -> Option<MachineId> {
        match self {
            Notification::JobStart { host, .. }
            | Notification::JobFinish { host, .. }
            | Notification::JobRecalculate { host, .. }
            | Notification::VmStart { host, .. }
            | Notification::VmEnd { host, .. } => Some(*host),
            Notification::Other { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerControl {
    Keep,
    Unregister,
}

/// Observer of the notification stream. Listeners see the simulation read-only.
pub trait NotificationListener {
    fn notify(&mut self, notification: &Notification, ctx: &SimulationContext) -> ListenerControl;
}

/// Lets a caller keep a handle on a listener it registered.
impl<L: NotificationListener> NotificationListener for Rc<RefCell<L>> {
    fn notify(&mut self, notification: &Notification, ctx: &SimulationContext) -> ListenerControl {
        self.borrow_mut().notify(notification, ctx)
    }
}

/// External listeners in registration order.
///
/// Registrations and removals take effect at the start of the next dispatch, never in the middle of one.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: SlotMap<ListenerId, Box<dyn NotificationListener>>,
    active: Vec<ListenerId>,
    to_register: Vec<ListenerId>,
    to_unregister: Vec<ListenerId>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Box<dyn NotificationListener>) -> ListenerId {
        let id = self.listeners.insert(listener);
        self.to_register.push(id);
        id
    }

    pub fn unregister(&mut self, id: ListenerId) {
        self.to_unregister.push(id);
    }

    pub fn len(&self) -> usize {
        self.active.iter().chain(self.to_register.iter()).filter(|id| !self.to_unregister.contains(*id)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply_pending(&mut self) {
        self.active.append(&mut self.to_register);
        for id in self.to_unregister.drain(..) {
            self.active.retain(|a| *a != id);
            self.listeners.remove(id);
        }
    }

    pub fn dispatch(&mut self, notification: &Notification, ctx: &SimulationContext) {
        self.apply_pending();
        for id in self.active.clone() {
            if let Some(listener) = self.listeners.get_mut(id) {
                if listener.notify(notification, ctx) == ListenerControl::Unregister {
                    self.to_unregister.push(id);
                }
            }
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry").field("active", &self.active).field("pending", &self.to_register.len()).finish()
    }
}
