use std::collections::BTreeMap;

use crate::domain::cluster_model::cluster_model::ClusterModel;
use crate::domain::cluster_model::job::job::JobId;
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::cluster_model::resource::resource::ResourceType;
use crate::error::{Error, Result};

/// Amount per resource type: unit counts for cores and GPUs, capacity for RAM.
pub type Dims = BTreeMap<ResourceType, f64>;

/// A virtual machine waiting for placement, sized for packing.
///
/// `dims` holds the VM's core count, RAM and GPU count. `length` estimates how long the VM's job runs on a host
/// whose units deliver `unit_speeds` each.
#[derive(Debug, Clone)]
pub struct Task {
    vm: MachineId,
    job: JobId,
    job_index: u64,
    dims: Dims,
    initial_cores: f64,
    job_cores: f64,
    operations: BTreeMap<ResourceType, f64>,
    unit_speeds: Dims,
    pub(crate) startpoint: Option<f64>,
    pub(crate) endpoint: Option<f64>,
}

impl Task {
    pub fn new(model: &ClusterModel, vm: MachineId, job: JobId, unit_speeds: &Dims) -> Result<Self> {
        let mut dims = Dims::new();
        for (rtype, value) in model.get_max_resources(vm)? {
            let amount = if rtype == ResourceType::Ram { value } else { 1.0 };
            *dims.entry(rtype).or_insert(0.0) += amount;
        }

        let job_state = model.get_job(job)?;
        let job_cores = job_state.get_resource_requests().iter().filter(|r| r.rtype == ResourceType::CpuCore).count() as f64;
        let operations: BTreeMap<ResourceType, f64> = job_state.get_operations().iter().filter(|(_, ops)| **ops > 0.0).map(|(t, o)| (*t, *o)).collect();

        for rtype in operations.keys() {
            let units = dims.get(rtype).cloned().unwrap_or(0.0);
            let speed = unit_speeds.get(rtype).cloned().unwrap_or(0.0);
            if units <= 0.0 || speed <= 0.0 {
                return Err(Error::InvalidTask(format!("{} has {:?} work but no {:?} capacity", job_state.get_name(), rtype, rtype)));
            }
        }
        if operations.contains_key(&ResourceType::CpuCore) && job_cores == 0.0 {
            return Err(Error::InvalidTask(format!("{} has CPU work but requests no cores", job_state.get_name())));
        }

        let initial_cores = dims.get(&ResourceType::CpuCore).cloned().unwrap_or(0.0);
        Ok(Task {
            vm,
            job,
            job_index: job_state.get_index(),
            dims,
            initial_cores,
            job_cores,
            operations,
            unit_speeds: unit_speeds.clone(),
            startpoint: None,
            endpoint: None,
        })
    }

    pub fn get_vm(&self) -> MachineId {
        self.vm
    }

    pub fn get_job(&self) -> JobId {
        self.job
    }

    pub fn get_job_index(&self) -> u64 {
        self.job_index
    }

    pub fn get_dims(&self) -> &Dims {
        &self.dims
    }

    pub fn get_dim(&self, rtype: ResourceType) -> f64 {
        self.dims.get(&rtype).cloned().unwrap_or(0.0)
    }

    pub fn get_cores(&self) -> f64 {
        self.get_dim(ResourceType::CpuCore)
    }

    pub fn get_startpoint(&self) -> Option<f64> {
        self.startpoint
    }

    pub fn get_endpoint(&self) -> Option<f64> {
        self.endpoint
    }

    /// Estimated run time with the current dimensions.
    pub fn length(&self) -> f64 {
        self.length_with_cores(self.get_cores())
    }

    /// Estimated run time if the VM had `cores` cores.
    pub fn length_with_cores(&self, cores: f64) -> f64 {
        let mut length: f64 = 0.0;
        for (rtype, ops) in &self.operations {
            let units = match rtype {
                ResourceType::CpuCore => cores.min(self.job_cores),
                _ => self.get_dim(*rtype),
            };
            let speed = units * self.unit_speeds.get(rtype).cloned().unwrap_or(0.0);
            length = length.max(if speed > 0.0 { ops / speed } else { f64::INFINITY });
        }
        length
    }

    /// Takes `by` cores away, keeping at least one.
    pub fn reduce_cores(&mut self, by: f64) {
        let cores = (self.get_cores() - by).max(1.0);
        self.dims.insert(ResourceType::CpuCore, cores);
    }

    pub fn restore_cores(&mut self) {
        self.dims.insert(ResourceType::CpuCore, self.initial_cores);
    }
}
