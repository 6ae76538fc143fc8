use slotmap::{SlotMap, new_key_type};
use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};

use crate::domain::cluster_model::utils::ordered_float::TimePoint;
use crate::domain::simulator::event::EventKind;
use crate::error::{Error, Result};

new_key_type! {
    pub struct EventId;
}

/// An event together with its position in the total execution order.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub time: f64,
    pub priority: i32,
    pub index: u64,
    pub kind: EventKind,
}

/// Earlier time first, then higher priority, then creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    time: TimePoint,
    priority: Reverse<i32>,
    index: u64,
}

impl QueueKey {
    fn of(event: &ScheduledEvent) -> Self {
        QueueKey { time: TimePoint(event.time), priority: Reverse(event.priority), index: event.index }
    }
}

/// Pending events in deterministic execution order, the simulation clock and the executed-event history.
#[derive(Debug)]
pub struct EventQueue {
    now: f64,
    next_index: u64,
    pending: BTreeMap<QueueKey, EventId>,
    events: SlotMap<EventId, ScheduledEvent>,
    history: VecDeque<ScheduledEvent>,
    history_limit: Option<usize>,
}

impl EventQueue {
    pub fn new(history_limit: Option<usize>) -> Self {
        EventQueue { now: 0.0, next_index: 0, pending: BTreeMap::new(), events: SlotMap::with_key(), history: VecDeque::new(), history_limit }
    }

    /// Current simulated time: the timestamp of the last popped event.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Schedules `kind` at `time` with the default priority of its kind.
    pub fn add_event(&mut self, time: f64, kind: EventKind) -> Result<EventId> {
        let priority = kind.default_priority();
        self.add_event_with_priority(time, kind, priority)
    }

    /// Schedules `kind` at `time`.
    ///
    /// # Returns
    /// The handle of the event, or `Error::PastEvent` if `time` lies before the current time.
    pub fn add_event_with_priority(&mut self, time: f64, kind: EventKind, priority: i32) -> Result<EventId> {
        if !(time >= self.now) {
            return Err(Error::PastEvent { time, now: self.now });
        }
        let event = ScheduledEvent { time, priority, index: self.next_index, kind };
        self.next_index += 1;

        let key = QueueKey::of(&event);
        let id = self.events.insert(event);
        self.pending.insert(key, id);
        Ok(id)
    }

    /// Cancels a pending event.
    ///
    /// # Returns
    /// The cancelled event, or `Error::AlreadyExecuted` if it is not pending anymore.
    pub fn remove_event(&mut self, id: EventId) -> Result<ScheduledEvent> {
        let event = self.events.remove(id).ok_or(Error::AlreadyExecuted(id))?;
        self.pending.remove(&QueueKey::of(&event));
        Ok(event)
    }

    pub fn is_pending(&self, id: EventId) -> bool {
        self.events.contains_key(id)
    }

    pub fn get(&self, id: EventId) -> Option<&ScheduledEvent> {
        self.events.get(id)
    }

    /// Removes the next event and advances the clock to its time.
    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        let (_, id) = self.pending.pop_first()?;
        let event = self.events.remove(id)?;
        self.now = event.time;
        Some(event)
    }

    pub fn peek_time(&self) -> Option<f64> {
        self.pending.first_key_value().map(|(key, _)| key.time.0)
    }

    pub(crate) fn record(&mut self, event: ScheduledEvent) {
        self.history.push_back(event);
        if let Some(limit) = self.history_limit {
            while self.history.len() > limit {
                self.history.pop_front();
            }
        }
    }

    /// Executed events, oldest first.
    pub fn get_history(&self) -> &VecDeque<ScheduledEvent> {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
