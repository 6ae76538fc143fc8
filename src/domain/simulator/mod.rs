pub mod config;
pub mod event;
pub mod event_inspector;
pub mod event_queue;
pub mod notification;
pub mod simulation_context;
pub mod simulator;
