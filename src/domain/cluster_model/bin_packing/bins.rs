use std::collections::VecDeque;
use std::fmt::Debug;

use crate::domain::cluster_model::bin_packing::task::{Dims, Task};
use crate::domain::cluster_model::bin_packing::timeline::Timeline;
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::cluster_model::resource::resource::ResourceType;
use crate::error::{Error, Result};

#[derive(Debug)]
pub enum AddOutcome {
    Added,
    /// The task does not fit and is handed back.
    Rejected(Task),
}

/// A capacity-bounded batch of tasks.
///
/// While open, tasks can be added and removed. Closing fixes the order in which tasks leave the bin.
pub trait Bin: Debug + Clone {
    fn get_max_dims(&self) -> &Dims;

    /// Duration the bin keeps its capacity busy.
    fn length(&self) -> f64;

    fn tasks(&self) -> Vec<&Task>;

    fn add(&mut self, task: Task) -> Result<AddOutcome>;

    fn remove(&mut self, vm: MachineId) -> Result<Option<Task>>;

    fn close(&mut self);

    fn is_closed(&self) -> bool;

    fn get_next(&self) -> Option<MachineId>;

    /// Takes the next task of a closed bin, closing it first if needed.
    fn pop_next(&mut self) -> Option<Task>;

    fn len(&self) -> usize {
        self.tasks().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Busy area per resource type relative to `capacity × length`.
    fn efficiency(&self) -> Dims {
        let length = self.length();
        self.get_max_dims()
            .iter()
            .map(|(rtype, max)| {
                let area: f64 = self.tasks().iter().map(|t| t.get_dim(*rtype) * t.length()).sum();
                let total = max * length;
                (*rtype, if total > 0.0 { area / total } else { 0.0 })
            })
            .collect()
    }
}

fn exceeds(dims: &Dims, max_dims: &Dims, skip: Option<ResourceType>) -> bool {
    dims.iter().any(|(rtype, amount)| Some(*rtype) != skip && *amount > max_dims.get(rtype).cloned().unwrap_or(0.0))
}

fn summed_dims<'a>(tasks: impl Iterator<Item = &'a Task>) -> Dims {
    let mut dims = Dims::new();
    for task in tasks {
        for (rtype, amount) in task.get_dims() {
            *dims.entry(*rtype).or_insert(0.0) += amount;
        }
    }
    dims
}

/// All tasks run side by side, the bin rejects a task that would oversubscribe any dimension.
#[derive(Debug, Clone)]
pub struct SimpleBin {
    max_dims: Dims,
    tasks: VecDeque<Task>,
    closed: bool,
}

impl SimpleBin {
    pub fn new(max_dims: Dims) -> Self {
        SimpleBin { max_dims, tasks: VecDeque::new(), closed: false }
    }

    pub fn get_current_dims(&self) -> Dims {
        summed_dims(self.tasks.iter())
    }
}

impl Bin for SimpleBin {
    fn get_max_dims(&self) -> &Dims {
        &self.max_dims
    }

    fn length(&self) -> f64 {
        self.tasks.iter().map(Task::length).fold(0.0, f64::max)
    }

    fn tasks(&self) -> Vec<&Task> {
        self.tasks.iter().collect()
    }

    fn add(&mut self, task: Task) -> Result<AddOutcome> {
        if self.closed {
            return Err(Error::BinClosed);
        }
        let dims = summed_dims(self.tasks.iter().chain(std::iter::once(&task)));
        if exceeds(&dims, &self.max_dims, None) {
            return Ok(AddOutcome::Rejected(task));
        }
        self.tasks.push_back(task);
        Ok(AddOutcome::Added)
    }

    fn remove(&mut self, vm: MachineId) -> Result<Option<Task>> {
        if self.closed {
            return Err(Error::BinClosed);
        }
        let position = self.tasks.iter().position(|t| t.get_vm() == vm);
        Ok(position.and_then(|p| self.tasks.remove(p)))
    }

    fn close(&mut self) {
        self.tasks.make_contiguous().sort_by_key(|t| t.get_job_index());
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn get_next(&self) -> Option<MachineId> {
        self.tasks.front().map(Task::get_vm)
    }

    fn pop_next(&mut self) -> Option<Task> {
        if !self.closed {
            self.close();
        }
        self.tasks.pop_front()
    }
}

/// Like [`SimpleBin`], but squeezes tasks onto fewer cores (making them longer) before rejecting one.
///
/// The core taken away is always the one that stretches the bin the least. Removing a task gives every remaining
/// task its cores back before squeezing again.
#[derive(Debug, Clone)]
pub struct ReductiveBin {
    base: SimpleBin,
}

impl ReductiveBin {
    pub fn new(max_dims: Dims) -> Self {
        ReductiveBin { base: SimpleBin::new(max_dims) }
    }

    fn core_overflow(&self) -> bool {
        let used = self.base.get_current_dims().get(&ResourceType::CpuCore).cloned().unwrap_or(0.0);
        used > self.base.max_dims.get(&ResourceType::CpuCore).cloned().unwrap_or(0.0)
    }

    /// Takes one core from the task whose length grows least past the bin length.
    fn reduce_one(&mut self) -> bool {
        let bin_length = self.base.length();
        let mut best: Option<(usize, f64)> = None;
        for (position, task) in self.base.tasks.iter().enumerate() {
            if task.get_cores() < 2.0 {
                continue;
            }
            let overhead = task.length_with_cores(task.get_cores() - 1.0) - bin_length;
            if best.is_none_or(|(_, b)| overhead < b) {
                best = Some((position, overhead));
            }
        }
        match best {
            Some((position, _)) => {
                self.base.tasks[position].reduce_cores(1.0);
                true
            }
            None => false,
        }
    }

    fn squeeze(&mut self) -> bool {
        while self.core_overflow() {
            if !self.reduce_one() {
                return false;
            }
        }
        true
    }
}

impl Bin for ReductiveBin {
    fn get_max_dims(&self) -> &Dims {
        self.base.get_max_dims()
    }

    fn length(&self) -> f64 {
        self.base.length()
    }

    fn tasks(&self) -> Vec<&Task> {
        self.base.tasks()
    }

    fn add(&mut self, task: Task) -> Result<AddOutcome> {
        if self.base.closed {
            return Err(Error::BinClosed);
        }
        let dims = summed_dims(self.base.tasks.iter().chain(std::iter::once(&task)));
        if exceeds(&dims, &self.base.max_dims, Some(ResourceType::CpuCore)) {
            return Ok(AddOutcome::Rejected(task));
        }

        let snapshot: Vec<f64> = self.base.tasks.iter().map(Task::get_cores).collect();
        self.base.tasks.push_back(task);
        if self.squeeze() {
            return Ok(AddOutcome::Added);
        }

        for (task, cores) in self.base.tasks.iter_mut().zip(snapshot) {
            task.restore_cores();
            task.reduce_cores(task.get_cores() - cores);
        }
        let mut rejected = self.base.tasks.pop_back().ok_or(Error::BinClosed)?;
        rejected.restore_cores();
        Ok(AddOutcome::Rejected(rejected))
    }

    fn remove(&mut self, vm: MachineId) -> Result<Option<Task>> {
        let removed = self.base.remove(vm)?.map(|mut t| {
            t.restore_cores();
            t
        });
        if removed.is_some() {
            self.base.tasks.iter_mut().for_each(Task::restore_cores);
            self.squeeze();
        }
        Ok(removed)
    }

    fn close(&mut self) {
        self.base.close();
    }

    fn is_closed(&self) -> bool {
        self.base.is_closed()
    }

    fn get_next(&self) -> Option<MachineId> {
        self.base.get_next()
    }

    fn pop_next(&mut self) -> Option<Task> {
        self.base.pop_next()
    }
}

/// Tasks are laid out in time: each starts at the earliest moment where it fits for its whole length.
#[derive(Debug, Clone)]
pub struct TimelineBin {
    max_dims: Dims,
    pub(crate) timeline: Timeline,
    order: VecDeque<Task>,
    closed: bool,
}

impl TimelineBin {
    pub fn new(max_dims: Dims) -> Self {
        TimelineBin { max_dims, timeline: Timeline::new(), order: VecDeque::new(), closed: false }
    }

    pub fn get_timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Inserts `task` at its earliest fitting start.
    ///
    /// # Returns
    /// The start time.
    pub fn add_to_timeline(&mut self, task: Task) -> f64 {
        let time = self.timeline.earliest_fit(&task, &self.max_dims);
        self.timeline.add(time, task);
        time
    }
}

impl Bin for TimelineBin {
    fn get_max_dims(&self) -> &Dims {
        &self.max_dims
    }

    fn length(&self) -> f64 {
        self.timeline.span()
    }

    fn tasks(&self) -> Vec<&Task> {
        if self.closed { self.order.iter().collect() } else { self.timeline.tasks_in_order() }
    }

    fn add(&mut self, task: Task) -> Result<AddOutcome> {
        if self.closed {
            return Err(Error::BinClosed);
        }
        if exceeds(task.get_dims(), &self.max_dims, None) {
            return Ok(AddOutcome::Rejected(task));
        }
        self.add_to_timeline(task);
        Ok(AddOutcome::Added)
    }

    fn remove(&mut self, vm: MachineId) -> Result<Option<Task>> {
        if self.closed {
            return Err(Error::BinClosed);
        }
        Ok(self.timeline.remove(vm))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.order = self.timeline.tasks_in_order().into_iter().cloned().collect();
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn get_next(&self) -> Option<MachineId> {
        self.order.front().map(Task::get_vm)
    }

    fn pop_next(&mut self) -> Option<Task> {
        if !self.closed {
            self.close();
        }
        self.order.pop_front()
    }
}
