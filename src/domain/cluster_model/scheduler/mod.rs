pub mod job_scheduler;
pub mod scheduler;
pub mod scheduler_store;
pub mod vm_scheduler;
