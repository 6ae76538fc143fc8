use thiserror::Error;

use crate::domain::cluster_model::resource::resource::ResourceType;
use crate::domain::simulator::event_queue::EventId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid resource request for {rtype:?}: value {value} must be positive")]
    InvalidRequest { rtype: ResourceType, value: f64 },

    #[error("Invalid job {name}: {reason}")]
    InvalidJob { name: String, reason: String },

    #[error("Cannot find fitting {rtype:?} resource: requested {requested}, available {available}")]
    InsufficientCapacity { rtype: ResourceType, requested: f64, available: f64 },

    #[error("Resources allocation for {holder} failed: {source}")]
    AllocationFailed {
        holder: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{holder} already holds resources")]
    AlreadyAllocated { holder: String },

    #[error("{holder} is not allocated on machine {machine}")]
    NotAllocated { holder: String, machine: String },

    #[error("Resource overflow after release of {released} {rtype:?}: tmpMaxValue {tmp_max_value} exceeds maxValue {max_value}")]
    Overflow { rtype: ResourceType, released: f64, tmp_max_value: f64, max_value: f64 },

    #[error("{holder} can never be allocated on machine {machine}")]
    NeverFits { holder: String, machine: String },

    #[error("Job {job} has outstanding {rtype:?} operations but no capacity of that type")]
    NoCapacity { job: String, rtype: ResourceType },

    #[error("Job {job} has no progress record yet")]
    NotStarted { job: String },

    #[error("Cannot add event at {time}, simulation time is already {now}")]
    PastEvent { time: f64, now: f64 },

    #[error("Event {0:?} is not pending anymore")]
    AlreadyExecuted(EventId),

    #[error("Unknown {0}")]
    NotFound(String),

    #[error("Machine {machine} has no {kind} scheduler")]
    NoScheduler { machine: String, kind: &'static str },

    #[error("Scheduler of machine {machine} has already finished")]
    SchedulerFinished { machine: String },

    #[error("Scheduler of machine {machine} cannot schedule {entity}")]
    UnsupportedEntity { machine: String, entity: String },

    #[error("Machine {machine} still runs jobs or hosts virtual machines")]
    MachineBusy { machine: String },

    #[error("Virtual machine {vm} is hosted on {host}, not on {requested}")]
    WrongHost { vm: String, host: String, requested: String },

    #[error("Virtual machine {0} is unknown to the infrastructure")]
    UnknownVm(String),

    #[error("No suitable machine found for {0}")]
    NoSuitableMachine(String),

    #[error("Cannot build bin-packing task: {0}")]
    InvalidTask(String),

    #[error("Bin is closed for modification")]
    BinClosed,
}

impl Error {
    /// Returns true for allocation failures, which probing events treat as a regular "does not fit yet" outcome.
    pub fn is_allocation_failure(&self) -> bool {
        matches!(self, Error::AllocationFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
