use std::ops::{Deref, DerefMut};

use crate::domain::simulator::config::SimulationConfig;
use crate::domain::simulator::notification::{ListenerId, ListenerRegistry, Notification, NotificationListener, SIMULATION_START};
use crate::domain::simulator::simulation_context::SimulationContext;
use crate::error::Result;

/// Drives a [`SimulationContext`] event by event and broadcasts what happened.
///
/// After an event executed, its notification goes to the schedulers first, then to the registered listeners.
/// The very first step broadcasts a `SimulationStart` notification before any event runs.
#[derive(Debug, Default)]
pub struct Simulator {
    ctx: SimulationContext,
    listeners: ListenerRegistry,
    started: bool,
}

impl Deref for Simulator {
    type Target = SimulationContext;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

impl DerefMut for Simulator {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ctx
    }
}

impl Simulator {
    pub fn new(config: SimulationConfig) -> Self {
        Simulator { ctx: SimulationContext::new(config), listeners: ListenerRegistry::new(), started: false }
    }

    pub fn get_context(&self) -> &SimulationContext {
        &self.ctx
    }

    /// Registration takes effect with the next broadcast.
    pub fn register_listener<L: NotificationListener + 'static>(&mut self, listener: L) -> ListenerId {
        self.listeners.register(Box::new(listener))
    }

    /// Removal takes effect with the next broadcast.
    pub fn unregister_listener(&mut self, id: ListenerId) {
        self.listeners.unregister(id);
    }

    /// Executes the next pending event.
    ///
    /// # Returns
    /// `false` once no event is left.
    pub fn step(&mut self) -> Result<bool> {
        if !self.started {
            self.started = true;
            self.emit(&Notification::other(SIMULATION_START))?;
        }

        let Some(event) = self.ctx.queue.pop() else {
            return Ok(false);
        };
        tracing::trace!(time = event.time, priority = event.priority, index = event.index, "executing {}", event.kind.get_name());

        let notification = self.ctx.execute(&event.kind)?;
        self.ctx.queue.record(event);
        if let Some(notification) = notification {
            self.emit(&notification)?;
        }
        Ok(true)
    }

    /// Executes events until the queue is empty.
    pub fn run(&mut self) -> Result<()> {
        log::info!("Simulation started with {} pending events.", self.ctx.queue.len());
        let mut executed: u64 = 0;
        while self.step()? {
            executed += 1;
        }
        log::info!("Simulation ended at {} after {} events.", self.ctx.now(), executed);
        Ok(())
    }

    fn emit(&mut self, notification: &Notification) -> Result<()> {
        self.ctx.notify_schedulers(notification)?;
        self.listeners.dispatch(notification, &self.ctx);
        Ok(())
    }
}
