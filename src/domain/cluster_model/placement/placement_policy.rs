use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::fmt;

use crate::domain::cluster_model::cluster_model::ClusterModel;
use crate::domain::cluster_model::job::job::JobId;
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::cluster_model::resource::resources_holder::Holder;
use crate::domain::cluster_model::scheduler::scheduler_store::SchedulerStore;
use crate::error::{Error, Result};

/// Chooses the physical machine a virtual machine is queued on.
///
/// Every policy treats `is_fittable` as a hard filter; the chosen machine's VM scheduler receives the VM.
pub trait VmPlacementPolicy: fmt::Debug {
    fn place_vm(&mut self, vm: MachineId, model: &ClusterModel, schedulers: &mut SchedulerStore, pending_jobs: &[JobId]) -> Result<MachineId>;
}

/// Hands `vm` to the VM scheduler of `machine`.
fn submit(machine: MachineId, vm: MachineId, model: &ClusterModel, schedulers: &mut SchedulerStore, pending_jobs: &[JobId]) -> Result<()> {
    let scheduler = model.get_machine(machine)?.get_vm_scheduler().ok_or_else(|| Error::NoScheduler { machine: model.get_machine_name(machine), kind: "VM" })?;
    schedulers.schedule(scheduler, Holder::Vm(vm), model, pending_jobs)
}

/// Least-loaded placement: the machine that received the fewest VMs so far, ties broken by machine creation order.
#[derive(Debug)]
pub struct VmPlacementPolicySimple {
    load: Vec<(usize, MachineId)>,
}

impl VmPlacementPolicySimple {
    pub fn new(machines: &[MachineId]) -> Self {
        VmPlacementPolicySimple { load: machines.iter().map(|m| (0, *m)).collect() }
    }

    pub fn get_load(&self, machine: MachineId) -> Option<usize> {
        self.load.iter().find(|(_, m)| *m == machine).map(|(count, _)| *count)
    }
}

impl VmPlacementPolicy for VmPlacementPolicySimple {
    fn place_vm(&mut self, vm: MachineId, model: &ClusterModel, schedulers: &mut SchedulerStore, pending_jobs: &[JobId]) -> Result<MachineId> {
        let mut candidates: Vec<(usize, u64, usize)> = Vec::with_capacity(self.load.len());
        for (position, (count, machine)) in self.load.iter().enumerate() {
            candidates.push((*count, model.get_machine(*machine)?.get_index(), position));
        }
        candidates.sort();

        for (_, _, position) in candidates {
            let machine = self.load[position].1;
            if model.is_fittable(machine, Holder::Vm(vm))? {
                submit(machine, vm, model, schedulers, pending_jobs)?;
                self.load[position].0 += 1;
                log::debug!("Placed {} on {}.", model.get_machine_name(vm), model.get_machine_name(machine));
                return Ok(machine);
            }
        }
        Err(Error::NoSuitableMachine(model.get_machine_name(vm)))
    }
}

/// Uniformly random placement among the machines the VM fits on.
#[derive(Debug)]
pub struct VmPlacementPolicyRandom {
    machines: Vec<MachineId>,
    rng: StdRng,
}

impl VmPlacementPolicyRandom {
    pub fn new(machines: &[MachineId]) -> Self {
        VmPlacementPolicyRandom { machines: machines.to_vec(), rng: StdRng::from_rng(&mut rand::rng()) }
    }

    /// Reproducible variant for experiments.
    pub fn with_seed(machines: &[MachineId], seed: u64) -> Self {
        VmPlacementPolicyRandom { machines: machines.to_vec(), rng: StdRng::seed_from_u64(seed) }
    }
}

impl VmPlacementPolicy for VmPlacementPolicyRandom {
    fn place_vm(&mut self, vm: MachineId, model: &ClusterModel, schedulers: &mut SchedulerStore, pending_jobs: &[JobId]) -> Result<MachineId> {
        let mut order = self.machines.clone();
        order.shuffle(&mut self.rng);

        for machine in order {
            if model.is_fittable(machine, Holder::Vm(vm))? {
                submit(machine, vm, model, schedulers, pending_jobs)?;
                return Ok(machine);
            }
        }
        Err(Error::NoSuitableMachine(model.get_machine_name(vm)))
    }
}

/// Scores `(vm, machine)` pairs. Must not have side effects.
pub type PlacementScore = Box<dyn Fn(&ClusterModel, MachineId, MachineId) -> f64>;

/// Placement on the fittable machine with the highest score, the first one on ties.
///
/// Hosts learned or heuristic policies: they only provide the scoring function.
pub struct VmPlacementPolicyScored {
    machines: Vec<MachineId>,
    score: PlacementScore,
}

impl VmPlacementPolicyScored {
    pub fn new(machines: &[MachineId], score: PlacementScore) -> Self {
        VmPlacementPolicyScored { machines: machines.to_vec(), score }
    }
}

impl fmt::Debug for VmPlacementPolicyScored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmPlacementPolicyScored").field("machines", &self.machines).finish()
    }
}

impl VmPlacementPolicy for VmPlacementPolicyScored {
    fn place_vm(&mut self, vm: MachineId, model: &ClusterModel, schedulers: &mut SchedulerStore, pending_jobs: &[JobId]) -> Result<MachineId> {
        let mut best: Option<(MachineId, f64)> = None;
        for machine in &self.machines {
            if !model.is_fittable(*machine, Holder::Vm(vm))? {
                continue;
            }
            let score = (self.score)(model, vm, *machine);
            if best.is_none_or(|(_, b)| score > b) {
                best = Some((*machine, score));
            }
        }

        let (machine, _) = best.ok_or_else(|| Error::NoSuitableMachine(model.get_machine_name(vm)))?;
        submit(machine, vm, model, schedulers, pending_jobs)?;
        Ok(machine)
    }
}
