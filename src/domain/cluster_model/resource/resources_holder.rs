use crate::domain::cluster_model::job::job::JobId;
use crate::domain::cluster_model::machine::machine::MachineId;
use crate::domain::cluster_model::resource::resource_request::ResourceRequest;
use crate::domain::cluster_model::resource::resource_store::ResourceId;

/// Anything that requests resources from a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Holder {
    Job(JobId),
    Vm(MachineId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantKind {
    /// The holder uses the source unit itself at its fair-share rate.
    Shared(ResourceId),
    /// The holder owns a slice carved out of the source unit.
    Exclusive(ResourceId),
}

/// Result of one satisfied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub source: ResourceId,
    pub kind: GrantKind,
}

impl Grant {
    /// The resource whose `value` the holder actually consumes.
    pub fn get_resource(&self) -> ResourceId {
        match self.kind {
            GrantKind::Shared(id) | GrantKind::Exclusive(id) => id,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.kind, GrantKind::Shared(_))
    }
}

/// Ordered list of requests, each with the grant that currently satisfies it.
#[derive(Debug, Clone, Default)]
pub struct ResourcesHolder {
    slots: Vec<(ResourceRequest, Option<Grant>)>,
}

impl ResourcesHolder {
    pub fn new(requests: Vec<ResourceRequest>) -> Self {
        ResourcesHolder { slots: requests.into_iter().map(|r| (r, None)).collect() }
    }

    pub fn get_resource_requests(&self) -> Vec<ResourceRequest> {
        self.slots.iter().map(|(r, _)| *r).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Fraction of requests that currently hold a grant.
    pub fn is_allocated(&self) -> f64 {
        if self.slots.is_empty() {
            return 1.0;
        }
        let granted = self.slots.iter().filter(|(_, g)| g.is_some()).count();
        granted as f64 / self.slots.len() as f64
    }

    /// Request indices in allocation order: finite exclusive requests largest first, then dedicated ones, then shared
    /// ones. Ties keep declaration order, so the outcome only depends on the multiset of requests.
    pub fn allocation_order(&self) -> Vec<usize> {
        let mut fixed: Vec<usize> = self.slots.iter().enumerate().filter(|(_, (r, _))| !r.shared && !r.is_infinite()).map(|(i, _)| i).collect();
        fixed.sort_by(|a, b| self.slots[*b].0.value.total_cmp(&self.slots[*a].0.value));
        let dedicated = self.slots.iter().enumerate().filter(|(_, (r, _))| !r.shared && r.is_infinite()).map(|(i, _)| i);
        let shared = self.slots.iter().enumerate().filter(|(_, (r, _))| r.shared).map(|(i, _)| i);
        fixed.into_iter().chain(dedicated).chain(shared).collect()
    }

    pub fn get_request(&self, index: usize) -> Option<ResourceRequest> {
        self.slots.get(index).map(|(r, _)| *r)
    }

    pub(crate) fn set_grant(&mut self, index: usize, grant: Grant) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.1 = Some(grant);
        }
    }

    /// Grants in request order.
    pub fn get_grants(&self) -> Vec<Grant> {
        self.slots.iter().filter_map(|(_, g)| *g).collect()
    }

    /// Resources the holder consumes, in request order.
    pub fn get_obtained_resources(&self) -> Vec<ResourceId> {
        self.slots.iter().filter_map(|(_, g)| g.map(|g| g.get_resource())).collect()
    }

    /// Detaches every grant, leaving the holder unallocated.
    pub(crate) fn take_grants(&mut self) -> Vec<Grant> {
        self.slots.iter_mut().filter_map(|(_, g)| g.take()).collect()
    }
}
