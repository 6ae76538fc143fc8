use serde::{Deserialize, Serialize};

use crate::domain::cluster_model::job::job::JobId;
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::cluster_model::resource::resources_holder::Holder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    CpuCore,
    Ram,
    Gpu,
}

/// One unit of capacity (a core, a RAM pool, a GPU) owned by a machine, or an exclusive slice carved out of such a unit.
///
/// - `max_value`: nominal capacity.
/// - `tmp_max_value`: capacity not carved out by exclusive grants.
/// - `value`: rate a single dynamic user currently gets, `tmp_max_value / max(1, dynamic users)`.
/// - `freq`: speed multiplier applied when jobs turn capacity into operations per second.
#[derive(Debug, Clone)]
pub struct Resource {
    rtype: ResourceType,
    max_value: f64,
    value: f64,
    tmp_max_value: f64,
    freq: f64,
    job_users: Vec<JobId>,
    vm_users: Vec<MachineId>,
    dynamic_users: usize,
}

impl Resource {
    pub fn new(rtype: ResourceType, value: f64) -> Self {
        Self::with_freq(rtype, value, 1.0)
    }

    pub fn with_freq(rtype: ResourceType, value: f64, freq: f64) -> Self {
        Resource { rtype, max_value: value, value, tmp_max_value: value, freq, job_users: Vec::new(), vm_users: Vec::new(), dynamic_users: 0 }
    }

    pub fn get_type(&self) -> ResourceType {
        self.rtype
    }

    pub fn get_max_value(&self) -> f64 {
        self.max_value
    }

    pub fn get_value(&self) -> f64 {
        self.value
    }

    pub fn get_available_value(&self) -> f64 {
        self.tmp_max_value
    }

    pub fn get_freq(&self) -> f64 {
        self.freq
    }

    /// Rate delivered to one dynamic user, frequency included.
    pub fn get_speed(&self) -> f64 {
        self.value * self.freq
    }

    /// Number of shared job grants on this unit, counted with multiplicity.
    pub fn get_dynamic_users(&self) -> usize {
        self.dynamic_users
    }

    /// Distinct jobs holding any grant on this unit, in order of first use.
    pub fn jobs_using(&self) -> Vec<JobId> {
        let mut jobs: Vec<JobId> = Vec::new();
        for job in &self.job_users {
            if !jobs.contains(job) {
                jobs.push(*job);
            }
        }
        jobs
    }

    /// Distinct virtual machines holding any grant on this unit.
    pub fn vms_using(&self) -> Vec<MachineId> {
        let mut vms: Vec<MachineId> = Vec::new();
        for vm in &self.vm_users {
            if !vms.contains(vm) {
                vms.push(*vm);
            }
        }
        vms
    }

    pub fn is_used(&self) -> bool {
        !self.job_users.is_empty() || !self.vm_users.is_empty()
    }

    pub(crate) fn add_user(&mut self, holder: Holder) {
        match holder {
            Holder::Job(job) => self.job_users.push(job),
            Holder::Vm(vm) => self.vm_users.push(vm),
        }
    }

    /// Removes one occurrence of `holder` from the users.
    pub(crate) fn del_user(&mut self, holder: Holder) {
        match holder {
            Holder::Job(job) => {
                if let Some(pos) = self.job_users.iter().position(|j| *j == job) {
                    self.job_users.remove(pos);
                }
            }
            Holder::Vm(vm) => {
                if let Some(pos) = self.vm_users.iter().position(|v| *v == vm) {
                    self.vm_users.remove(pos);
                }
            }
        }
    }

    pub(crate) fn join_dynamic(&mut self) {
        self.dynamic_users += 1;
        self.recompute_value();
    }

    pub(crate) fn leave_dynamic(&mut self) {
        if self.dynamic_users == 0 {
            log::warn!("Dynamic user left a {:?} resource that had none registered.", self.rtype);
        }
        self.dynamic_users = self.dynamic_users.saturating_sub(1);
        self.recompute_value();
    }

    /// Carves `amount` out of the unreserved capacity.
    pub(crate) fn carve(&mut self, amount: f64) {
        self.tmp_max_value -= amount;
        self.recompute_value();
    }

    /// Returns `amount` to the unreserved capacity, clamped at `max_value`.
    pub(crate) fn restore(&mut self, amount: f64) {
        self.tmp_max_value = (self.tmp_max_value + amount).min(self.max_value);
        self.recompute_value();
    }

    fn recompute_value(&mut self) {
        self.value = self.tmp_max_value / self.dynamic_users.max(1) as f64;
    }
}
