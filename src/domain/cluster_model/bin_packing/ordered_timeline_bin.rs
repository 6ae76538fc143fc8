use itertools::Itertools;

use crate::domain::cluster_model::bin_packing::bins::{AddOutcome, Bin, TimelineBin};
use crate::domain::cluster_model::bin_packing::task::{Dims, Task};
use crate::domain::cluster_model::bin_packing::timeline::Timeline;
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::error::Result;

/// Above this many tasks the exhaustive search falls back to longest-first.
pub const EXHAUSTIVE_LIMIT: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineOrdering {
    /// Keep insertion order.
    Identity,
    /// Re-pack longest tasks first.
    LongestFirst,
    /// Try every insertion order, keep the shortest timeline.
    Exhaustive,
}

/// Packs `tasks` into a fresh timeline in the given order.
fn pack(tasks: Vec<Task>, max_dims: &Dims) -> Timeline {
    let mut timeline = Timeline::new();
    for task in tasks {
        let time = timeline.earliest_fit(&task, max_dims);
        timeline.add(time, task);
    }
    timeline
}

fn order_longest_first(mut tasks: Vec<Task>, max_dims: &Dims) -> Timeline {
    tasks.sort_by(|a, b| b.length().total_cmp(&a.length()).then(a.get_job_index().cmp(&b.get_job_index())));
    pack(tasks, max_dims)
}

fn order_exhaustive(tasks: Vec<Task>, max_dims: &Dims) -> Timeline {
    if tasks.len() > EXHAUSTIVE_LIMIT {
        log::debug!("{} tasks are too many for an exhaustive ordering, packing longest first.", tasks.len());
        return order_longest_first(tasks, max_dims);
    }

    let count = tasks.len();
    let mut best: Option<Timeline> = None;
    for permutation in tasks.into_iter().permutations(count) {
        let candidate = pack(permutation, max_dims);
        if best.as_ref().is_none_or(|b| candidate.span() < b.span()) {
            best = Some(candidate);
        }
    }
    best.unwrap_or_default()
}

/// A [`TimelineBin`] that re-packs its timeline on every add, remove and close.
#[derive(Debug, Clone)]
pub struct OrderedTimelineBin {
    bin: TimelineBin,
    ordering: TimelineOrdering,
}

impl OrderedTimelineBin {
    pub fn new(max_dims: Dims, ordering: TimelineOrdering) -> Self {
        OrderedTimelineBin { bin: TimelineBin::new(max_dims), ordering }
    }

    pub fn longest_first(max_dims: Dims) -> Self {
        Self::new(max_dims, TimelineOrdering::LongestFirst)
    }

    pub fn exhaustive(max_dims: Dims) -> Self {
        Self::new(max_dims, TimelineOrdering::Exhaustive)
    }

    pub fn get_timeline(&self) -> &Timeline {
        self.bin.get_timeline()
    }

    fn reorder(&mut self) {
        let tasks: Vec<Task> = self.bin.timeline.tasks_in_order().into_iter().cloned().collect();
        let max_dims = self.bin.get_max_dims().clone();
        self.bin.timeline = match self.ordering {
            TimelineOrdering::Identity => return,
            TimelineOrdering::LongestFirst => order_longest_first(tasks, &max_dims),
            TimelineOrdering::Exhaustive => order_exhaustive(tasks, &max_dims),
        };
    }
}

impl Bin for OrderedTimelineBin {
    fn get_max_dims(&self) -> &Dims {
        self.bin.get_max_dims()
    }

    fn length(&self) -> f64 {
        self.bin.length()
    }

    fn tasks(&self) -> Vec<&Task> {
        self.bin.tasks()
    }

    fn add(&mut self, task: Task) -> Result<AddOutcome> {
        let outcome = self.bin.add(task)?;
        if let AddOutcome::Added = outcome {
            self.reorder();
        }
        Ok(outcome)
    }

    fn remove(&mut self, vm: MachineId) -> Result<Option<Task>> {
        let removed = self.bin.remove(vm)?;
        if removed.is_some() {
            self.reorder();
        }
        Ok(removed)
    }

    fn close(&mut self) {
        if !self.bin.is_closed() {
            self.reorder();
        }
        self.bin.close();
    }

    fn is_closed(&self) -> bool {
        self.bin.is_closed()
    }

    fn get_next(&self) -> Option<MachineId> {
        self.bin.get_next()
    }

    fn pop_next(&mut self) -> Option<Task> {
        if !self.bin.is_closed() {
            self.close();
        }
        self.bin.pop_next()
    }
}
