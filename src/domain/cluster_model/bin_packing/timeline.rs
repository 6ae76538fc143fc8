use std::collections::{BTreeMap, BTreeSet};

use crate::domain::cluster_model::bin_packing::task::{Dims, Task};
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::cluster_model::utils::ordered_float::TimePoint;

/// Breakpoints in time, each mapped to the tasks active from that point until the next one.
///
/// The last breakpoint always has no active task. Active tasks are kept ordered by job index.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    points: BTreeMap<TimePoint, BTreeSet<(u64, MachineId)>>,
    tasks: BTreeMap<MachineId, Task>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get_task(&self, vm: MachineId) -> Option<&Task> {
        self.tasks.get(&vm)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn timepoints(&self) -> Vec<f64> {
        self.points.keys().map(|t| t.0).collect()
    }

    /// Tasks active at `time`, by job index.
    pub fn active_at(&self, time: f64) -> Vec<MachineId> {
        self.points.range(..=TimePoint(time)).next_back().map(|(_, set)| set.iter().map(|(_, vm)| *vm).collect()).unwrap_or_default()
    }

    /// Distance between the first and the last breakpoint.
    pub fn span(&self) -> f64 {
        match (self.points.first_key_value(), self.points.last_key_value()) {
            (Some((first, _)), Some((last, _))) => last.0 - first.0,
            _ => 0.0,
        }
    }

    /// Tasks by start time, equal starts by job index.
    pub fn tasks_in_order(&self) -> Vec<&Task> {
        let mut seen: BTreeSet<MachineId> = BTreeSet::new();
        let mut ordered = Vec::with_capacity(self.tasks.len());
        for set in self.points.values() {
            for (_, vm) in set {
                if seen.insert(*vm) {
                    if let Some(task) = self.tasks.get(vm) {
                        ordered.push(task);
                    }
                }
            }
        }
        ordered
    }

    /// Places `task` on `[time, time + length)`.
    pub fn add(&mut self, time: f64, mut task: Task) {
        let start = TimePoint(time);
        let end = TimePoint(time + task.length());
        self.complete_point(start);
        self.complete_point(end);

        let key = (task.get_job_index(), task.get_vm());
        for (_, set) in self.points.range_mut(start..end) {
            set.insert(key);
        }
        task.startpoint = Some(start.0);
        task.endpoint = Some(end.0);
        self.tasks.insert(task.get_vm(), task);
    }

    pub fn remove(&mut self, vm: MachineId) -> Option<Task> {
        let mut task = self.tasks.remove(&vm)?;
        let (Some(start), Some(end)) = (task.startpoint, task.endpoint) else {
            return Some(task);
        };
        let (start, end) = (TimePoint(start), TimePoint(end));

        let key = (task.get_job_index(), vm);
        for (_, set) in self.points.range_mut(start..end) {
            set.remove(&key);
        }
        self.clear_point(start);
        self.clear_point(end);

        task.startpoint = None;
        task.endpoint = None;
        Some(task)
    }

    /// Earliest time from which `task` can run for its whole length without exceeding `max_dims`.
    pub fn earliest_fit(&self, task: &Task, max_dims: &Dims) -> f64 {
        let length = task.length();
        let mut fit_since: Option<f64> = None;
        for (time, set) in &self.points {
            if let Some(since) = fit_since {
                if time.0 - since >= length {
                    return since;
                }
            }
            if self.fits_next_to(set, task, max_dims) {
                fit_since.get_or_insert(time.0);
            } else {
                fit_since = None;
            }
        }
        fit_since.unwrap_or_else(|| self.points.last_key_value().map(|(t, _)| t.0).unwrap_or(0.0))
    }

    fn fits_next_to(&self, set: &BTreeSet<(u64, MachineId)>, task: &Task, max_dims: &Dims) -> bool {
        task.get_dims().iter().all(|(rtype, amount)| {
            let used: f64 = set.iter().filter_map(|(_, vm)| self.tasks.get(vm)).map(|t| t.get_dim(*rtype)).sum();
            used + amount <= max_dims.get(rtype).cloned().unwrap_or(0.0)
        })
    }

    /// Inserts a breakpoint carrying over the tasks active just before it.
    fn complete_point(&mut self, time: TimePoint) {
        if self.points.contains_key(&time) {
            return;
        }
        let active = self.points.range(..time).next_back().map(|(_, set)| set.clone()).unwrap_or_default();
        self.points.insert(time, active);
    }

    /// Drops a breakpoint that no longer changes the set of active tasks.
    fn clear_point(&mut self, time: TimePoint) {
        let Some(set) = self.points.get(&time) else { return };
        let previous = self.points.range(..time).next_back().map(|(_, set)| set.clone()).unwrap_or_default();
        if *set == previous {
            self.points.remove(&time);
        }
    }
}
