use crate::domain::cluster_model::bin_packing::bins::{AddOutcome, Bin};
use crate::domain::cluster_model::bin_packing::task::{Dims, Task};
use crate::domain::cluster_model::cluster_model::ClusterModel;
use crate::domain::cluster_model::job::job::JobId;
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::cluster_model::resource::resource::ResourceType;
use crate::domain::cluster_model::scheduler::vm_scheduler::{VmQueue, VmSchedulerSimple};
use crate::error::{Error, Result};

/// Bins whose length differs more than this (relative) from a task's length do not take the task.
pub const MAX_LENGTH_DIFF: f64 = 0.3;

/// VM scheduler that batches virtual machines into bins before offering them to the host.
pub type BinPackingScheduler<B> = VmSchedulerSimple<BinPackingQueue<B>>;

/// Open bins collecting new VMs and one closed bin whose VMs are currently being started.
#[derive(Debug)]
pub struct BinPackingQueue<B: Bin> {
    max_dims: Dims,
    unit_speeds: Dims,
    bins: Vec<B>,
    current: Option<B>,
    new_bin: fn(Dims) -> B,
}

impl<B: Bin> BinPackingQueue<B> {
    /// Sizes bins after `machine`: its core and GPU counts, its RAM, and the speed of its fastest units.
    pub fn for_machine(model: &ClusterModel, machine: MachineId, new_bin: fn(Dims) -> B) -> Result<Self> {
        let mut max_dims = Dims::new();
        let mut unit_speeds = Dims::new();
        for id in model.get_machine(machine)?.get_resources() {
            let resource = model.get_resource(id)?;
            let rtype = resource.get_type();
            let amount = if rtype == ResourceType::Ram { resource.get_max_value() } else { 1.0 };
            *max_dims.entry(rtype).or_insert(0.0) += amount;

            let speed = unit_speeds.entry(rtype).or_insert(0.0);
            *speed = speed.max(resource.get_max_value() * resource.get_freq());
        }
        Ok(BinPackingQueue { max_dims, unit_speeds, bins: Vec::new(), current: None, new_bin })
    }

    pub fn get_max_dims(&self) -> &Dims {
        &self.max_dims
    }

    pub fn get_unit_speeds(&self) -> &Dims {
        &self.unit_speeds
    }

    pub fn get_bins(&self) -> &[B] {
        &self.bins
    }

    /// Adds a prepared bin to the open ones.
    pub fn push_bin(&mut self, bin: B) {
        self.bins.push(bin);
    }

    /// Sizes a task for this host.
    pub fn make_task(&self, model: &ClusterModel, vm: MachineId, job: JobId) -> Result<Task> {
        Task::new(model, vm, job, &self.unit_speeds)
    }

    /// Score of adding `task` to `bin`: CPU efficiency gain, damped by the length mismatch.
    ///
    /// # Returns
    /// `None` when the bin is empty, the lengths differ too much or the task does not fit.
    pub fn evaluate_fitting(bin: &B, task: &Task) -> Result<Option<f64>> {
        let length = bin.length();
        if length <= 0.0 {
            return Ok(None);
        }
        let length_diff = (length - task.length()).abs() / length;
        if length_diff > MAX_LENGTH_DIFF {
            return Ok(None);
        }

        let before = bin.efficiency().get(&ResourceType::CpuCore).cloned().unwrap_or(0.0);
        let mut trial = bin.clone();
        match trial.add(task.clone())? {
            AddOutcome::Added => {
                let after = trial.efficiency().get(&ResourceType::CpuCore).cloned().unwrap_or(0.0);
                Ok(Some((1.0 - length_diff) * (after - before)))
            }
            AddOutcome::Rejected(_) => Ok(None),
        }
    }

    /// Adds `task` to the best scoring open bin, or to a new one.
    pub fn insert_task(&mut self, task: Task) -> Result<()> {
        let mut best: Option<(usize, f64)> = None;
        for (position, bin) in self.bins.iter().enumerate() {
            if let Some(score) = Self::evaluate_fitting(bin, &task)? {
                if best.is_none_or(|(_, b)| score > b) {
                    best = Some((position, score));
                }
            }
        }

        let task = match best {
            Some((position, _)) => match self.bins[position].add(task)? {
                AddOutcome::Added => return Ok(()),
                AddOutcome::Rejected(task) => task,
            },
            None => task,
        };

        let mut bin = (self.new_bin)(self.max_dims.clone());
        match bin.add(task)? {
            AddOutcome::Added => {
                self.bins.push(bin);
                Ok(())
            }
            AddOutcome::Rejected(task) => Err(Error::InvalidTask(format!("task of job {:?} exceeds an empty bin", task.get_job()))),
        }
    }

    /// Closes the open bin with the highest CPU efficiency and makes it current.
    fn load_next_bin(&mut self) -> bool {
        let mut best: Option<(usize, f64)> = None;
        for (position, bin) in self.bins.iter().enumerate() {
            let efficiency = bin.efficiency().get(&ResourceType::CpuCore).cloned().unwrap_or(0.0);
            if best.is_none_or(|(_, b)| efficiency > b) {
                best = Some((position, efficiency));
            }
        }
        let Some((position, _)) = best else {
            self.current = None;
            return false;
        };

        let mut bin = self.bins.remove(position);
        bin.close();
        self.current = Some(bin);
        true
    }
}

impl<B: Bin> VmQueue for BinPackingQueue<B> {
    fn push(&mut self, vm: MachineId, model: &ClusterModel, pending_jobs: &[JobId]) -> Result<()> {
        let [job] = pending_jobs else {
            return Err(Error::InvalidTask(format!("{} must have exactly one queued job, found {}", model.get_machine_name(vm), pending_jobs.len())));
        };
        let task = self.make_task(model, vm, *job)?;
        self.insert_task(task)
    }

    fn head(&mut self) -> Result<Option<MachineId>> {
        loop {
            if let Some(vm) = self.current.as_ref().and_then(|bin| bin.get_next()) {
                return Ok(Some(vm));
            }
            if !self.load_next_bin() {
                return Ok(None);
            }
        }
    }

    fn pop_front(&mut self) -> Result<Option<MachineId>> {
        Ok(self.current.as_mut().and_then(|bin| bin.pop_next()).map(|task| task.get_vm()))
    }

    fn queued(&self) -> Vec<MachineId> {
        let current = self.current.iter().flat_map(|bin| bin.tasks());
        current.chain(self.bins.iter().flat_map(|bin| bin.tasks())).map(Task::get_vm).collect()
    }
}
