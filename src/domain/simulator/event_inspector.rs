use crate::domain::cluster_model::job::job::JobId;
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::simulator::notification::{ListenerControl, Notification, NotificationListener, NotificationType};
use crate::domain::simulator::simulation_context::SimulationContext;

pub const TIME_TOLERANCE: f64 = 1e-6;

/// A notification the inspector waits for.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedNotification {
    pub kind: NotificationType,
    pub time: f64,
    pub job: Option<JobId>,
    pub vm: Option<MachineId>,
}

impl ExpectedNotification {
    pub fn new(kind: NotificationType, time: f64) -> Self {
        ExpectedNotification { kind, time, job: None, vm: None }
    }

    pub fn job(kind: NotificationType, time: f64, job: JobId) -> Self {
        ExpectedNotification { job: Some(job), ..Self::new(kind, time) }
    }

    pub fn vm(kind: NotificationType, time: f64, vm: MachineId) -> Self {
        ExpectedNotification { vm: Some(vm), ..Self::new(kind, time) }
    }

    fn matches(&self, notification: &Notification, now: f64) -> bool {
        self.kind == notification.get_type()
            && (self.time - now).abs() < TIME_TOLERANCE
            && self.job.is_none_or(|job| notification.get_job() == Some(job))
            && self.vm.is_none_or(|vm| notification.get_vm() == Some(vm))
    }
}

/// Listener checking that a list of notifications shows up, each at its expected time.
///
/// Every notification consumes the first expectation it matches. Notifications matching none are kept aside.
#[derive(Debug, Default)]
pub struct EventInspector {
    expected: Vec<ExpectedNotification>,
    unmatched: Vec<(f64, Notification)>,
}

impl EventInspector {
    pub fn new(expected: Vec<ExpectedNotification>) -> Self {
        EventInspector { expected, unmatched: Vec::new() }
    }

    pub fn expect(&mut self, expected: ExpectedNotification) {
        self.expected.push(expected);
    }

    pub fn all_registered(&self) -> bool {
        self.expected.is_empty()
    }

    pub fn get_missing(&self) -> &[ExpectedNotification] {
        &self.expected
    }

    pub fn get_unmatched(&self) -> &[(f64, Notification)] {
        &self.unmatched
    }
}

impl NotificationListener for EventInspector {
    fn notify(&mut self, notification: &Notification, ctx: &SimulationContext) -> ListenerControl {
        let now = ctx.now();
        match self.expected.iter().position(|e| e.matches(notification, now)) {
            Some(position) => {
                self.expected.remove(position);
            }
            None => self.unmatched.push((now, notification.clone())),
        }
        ListenerControl::Keep
    }
}
