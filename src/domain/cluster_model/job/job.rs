use slotmap::new_key_type;
use std::collections::BTreeMap;

use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::cluster_model::resource::resource::ResourceType;
use crate::domain::cluster_model::resource::resource_request::ResourceRequest;
use crate::domain::cluster_model::resource::resource_store::ResourceStore;
use crate::domain::cluster_model::resource::resources_holder::ResourcesHolder;
use crate::domain::cluster_model::utils::id::JobName;
use crate::domain::simulator::event_queue::EventId;
use crate::error::{Error, Result};

new_key_type! {
    pub struct JobId;
}

/// Work amount per resource type.
pub type Speed = BTreeMap<ResourceType, f64>;

/// Operations a job has to perform, per resource type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Operations(pub BTreeMap<ResourceType, f64>);

impl From<f64> for Operations {
    /// Plain number means CPU work.
    fn from(ops: f64) -> Self {
        Operations(BTreeMap::from([(ResourceType::CpuCore, ops)]))
    }
}

impl<const N: usize> From<[(ResourceType, f64); N]> for Operations {
    fn from(ops: [(ResourceType, f64); N]) -> Self {
        Operations(ops.into_iter().collect())
    }
}

impl From<BTreeMap<ResourceType, f64>> for Operations {
    fn from(ops: BTreeMap<ResourceType, f64>) -> Self {
        Operations(ops)
    }
}

/// Priority as a function of the time a job has been waiting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobPriority {
    Constant(f64),
    Linear { base: f64, rate: f64 },
}

impl JobPriority {
    pub fn evaluate(&self, waited: f64) -> f64 {
        match self {
            JobPriority::Constant(p) => *p,
            JobPriority::Linear { base, rate } => base + rate * waited,
        }
    }
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Constant(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Running,
    Finished,
}

#[derive(Debug)]
pub struct Job {
    name: JobName,
    index: u64,
    operations: BTreeMap<ResourceType, f64>,
    operations_left: BTreeMap<ResourceType, f64>,
    pub(crate) holder: ResourcesHolder,
    pub(crate) host: Option<MachineId>,
    pub(crate) predicted_finish: Option<EventId>,
    pub(crate) state: JobState,
    priority: JobPriority,
    progress_log: Vec<(f64, Speed)>,
}

impl Job {
    /// Creates a job. `index` is the creation counter of the owning simulation and orders jobs deterministically.
    pub fn new(name: JobName, index: u64, operations: Operations, requests: Vec<ResourceRequest>) -> Result<Self> {
        if requests.is_empty() {
            return Err(Error::InvalidJob { name: name.to_string(), reason: "no resource requests".to_string() });
        }
        if let Some((rtype, ops)) = operations.0.iter().find(|(_, ops)| !ops.is_finite() || **ops < 0.0) {
            return Err(Error::InvalidJob { name: name.to_string(), reason: format!("invalid {:?} operations {}", rtype, ops) });
        }

        Ok(Job {
            name,
            index,
            operations_left: operations.0.clone(),
            operations: operations.0,
            holder: ResourcesHolder::new(requests),
            host: None,
            predicted_finish: None,
            state: JobState::Created,
            priority: JobPriority::default(),
            progress_log: Vec::new(),
        })
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub(crate) fn set_priority(&mut self, priority: JobPriority) {
        self.priority = priority;
    }

    pub fn get_name(&self) -> &JobName {
        &self.name
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_operations(&self) -> &BTreeMap<ResourceType, f64> {
        &self.operations
    }

    pub fn get_operations_left(&self) -> &BTreeMap<ResourceType, f64> {
        &self.operations_left
    }

    /// Largest outstanding amount over all resource types.
    pub fn get_max_operations_left(&self) -> f64 {
        self.operations_left.values().cloned().fold(0.0, f64::max)
    }

    pub fn get_holder(&self) -> &ResourcesHolder {
        &self.holder
    }

    pub fn get_resource_requests(&self) -> Vec<ResourceRequest> {
        self.holder.get_resource_requests()
    }

    pub fn get_host(&self) -> Option<MachineId> {
        self.host
    }

    pub fn get_state(&self) -> JobState {
        self.state
    }

    pub fn get_predicted_finish(&self) -> Option<EventId> {
        self.predicted_finish
    }

    pub fn get_priority(&self, waited: f64) -> f64 {
        self.priority.evaluate(waited)
    }

    pub fn get_progress_log(&self) -> &[(f64, Speed)] {
        &self.progress_log
    }

    /// Work per second the granted resources deliver, summed per resource type.
    pub fn get_current_speed(&self, resources: &ResourceStore) -> Result<Speed> {
        let mut speed = Speed::new();
        for id in self.holder.get_obtained_resources() {
            let resource = resources.get(id)?;
            *speed.entry(resource.get_type()).or_insert(0.0) += resource.get_speed();
        }
        Ok(speed)
    }

    /// Time needed to finish the outstanding operations at `speed`: the slowest resource type decides.
    ///
    /// # Returns
    /// `Error::NoCapacity` if some type still has operations left but no speed.
    pub fn calculate_exec_time(&self, speed: &Speed) -> Result<f64> {
        let mut exec_time: f64 = 0.0;
        for (rtype, left) in &self.operations_left {
            if *left <= 0.0 {
                continue;
            }
            let rate = speed.get(rtype).cloned().unwrap_or(0.0);
            if rate <= 0.0 {
                return Err(Error::NoCapacity { job: self.name.to_string(), rtype: *rtype });
            }
            exec_time = exec_time.max(left / rate);
        }
        Ok(exec_time)
    }

    /// Applies the last recorded speed over `[last record, at_time]` to the outstanding operations.
    ///
    /// Leftovers below `epsilon` are clamped to zero.
    ///
    /// # Returns
    /// The work done per resource type, or `Error::NotStarted` without any speed record.
    pub fn register_progress(&mut self, at_time: f64, epsilon: f64) -> Result<Speed> {
        let (since, speed) = self.progress_log.last().ok_or_else(|| Error::NotStarted { job: self.name.to_string() })?;
        let elapsed = at_time - since;

        let mut done = Speed::new();
        for (rtype, left) in self.operations_left.iter_mut() {
            let work = (elapsed * speed.get(rtype).cloned().unwrap_or(0.0)).min(*left);
            *left -= work;
            if *left < epsilon {
                *left = 0.0;
            }
            done.insert(*rtype, work);
        }
        Ok(done)
    }

    /// Records that the job runs at `speed` from `time` on.
    pub fn update(&mut self, time: f64, speed: Speed) {
        if let Some((last, _)) = self.progress_log.last() {
            assert!(time >= *last, "Progress of job {} recorded at {} after {}", self.name, time, last);
        }
        self.progress_log.push((time, speed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(ops: impl Into<Operations>) -> Job {
        Job::new(JobName::new("job"), 0, ops.into(), vec![ResourceRequest::shared(ResourceType::CpuCore)]).unwrap()
    }

    #[test]
    fn test_constant_speed_conserves_work() {
        let mut job = job(100.0);
        job.update(2.0, Speed::from([(ResourceType::CpuCore, 4.0)]));

        let done = job.register_progress(7.0, 1e-10).unwrap();
        assert!((done[&ResourceType::CpuCore] - 20.0).abs() < 1e-9);
        assert!((job.get_operations_left()[&ResourceType::CpuCore] - 80.0).abs() < 1e-9);

        job.update(7.0, Speed::from([(ResourceType::CpuCore, 8.0)]));
        job.register_progress(100.0, 1e-10).unwrap();
        assert_eq!(job.get_operations_left()[&ResourceType::CpuCore], 0.0, "Progress is clamped at zero");
    }

    #[test]
    fn test_exec_time_is_bounded_by_slowest_type() {
        let job = job([(ResourceType::CpuCore, 200.0), (ResourceType::Gpu, 1024.0 * 15.0)]);
        let speed = Speed::from([(ResourceType::CpuCore, 20.0), (ResourceType::Gpu, 1024.0)]);
        assert!((job.calculate_exec_time(&speed).unwrap() - 15.0).abs() < 1e-9);

        let no_gpu = Speed::from([(ResourceType::CpuCore, 20.0)]);
        assert!(matches!(job.calculate_exec_time(&no_gpu), Err(Error::NoCapacity { rtype: ResourceType::Gpu, .. })));
    }

    #[test]
    fn test_progress_requires_a_speed_record() {
        let mut job = job(10.0);
        assert!(matches!(job.register_progress(1.0, 1e-10), Err(Error::NotStarted { .. })));
    }

    #[test]
    fn test_job_without_requests_is_rejected() {
        let result = Job::new(JobName::new("empty"), 0, Operations::from(1.0), vec![]);
        assert!(matches!(result, Err(Error::InvalidJob { .. })));
    }

    #[test]
    fn test_linear_priority_grows_with_waiting() {
        let job = job(1.0).with_priority(JobPriority::Linear { base: 1.0, rate: 0.5 });
        assert!((job.get_priority(4.0) - 3.0).abs() < 1e-9);
    }
}
