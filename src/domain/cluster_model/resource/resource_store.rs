use slotmap::{SlotMap, new_key_type};

use crate::domain::cluster_model::resource::resource::Resource;
use crate::domain::cluster_model::resource::resource_request::ResourceRequest;
use crate::domain::cluster_model::resource::resources_holder::{Grant, GrantKind, Holder};
use crate::error::{Error, Result};

new_key_type! {
    pub struct ResourceId;
}

/// Arena of every resource in a simulation: physical units and the exclusive slices carved out of them.
#[derive(Debug, Default)]
pub struct ResourceStore {
    slots: SlotMap<ResourceId, Resource>,
}

impl ResourceStore {
    pub fn new() -> Self {
        ResourceStore { slots: SlotMap::with_key() }
    }

    /// Adds a resource to the store.
    ///
    /// # Returns
    /// Returns the ResourceId (internal key of the store).
    pub fn add(&mut self, resource: Resource) -> ResourceId {
        self.slots.insert(resource)
    }

    pub fn get(&self, id: ResourceId) -> Result<&Resource> {
        self.slots.get(id).ok_or_else(|| Error::NotFound(format!("resource {:?}", id)))
    }

    pub(crate) fn get_mut(&mut self, id: ResourceId) -> Result<&mut Resource> {
        self.slots.get_mut(id).ok_or_else(|| Error::NotFound(format!("resource {:?}", id)))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Takes capacity from `id` for `holder`.
    ///
    /// Shared requests by jobs join the fair share of the unit. Shared requests by virtual machines pass the
    /// unit through untouched, the jobs later running inside the VM are the dynamic users. Exclusive requests
    /// carve a slice (the whole remainder for `INF`) that becomes a resource of its own.
    ///
    /// # Returns
    /// The grant, or `Error::InsufficientCapacity` when an exclusive request exceeds the unreserved capacity.
    pub fn withhold(&mut self, id: ResourceId, request: &ResourceRequest, holder: Holder) -> Result<Grant> {
        let resource = self.get_mut(id)?;

        if request.shared {
            if let Holder::Job(_) = holder {
                resource.join_dynamic();
            }
            return Ok(Grant { source: id, kind: GrantKind::Shared(id) });
        }

        let available = resource.get_available_value();
        let amount = if request.is_infinite() { available } else { request.value };
        if amount > available || amount <= 0.0 {
            return Err(Error::InsufficientCapacity { rtype: request.rtype, requested: request.value, available });
        }
        resource.carve(amount);

        let slice = Resource::with_freq(resource.get_type(), amount, resource.get_freq());
        let slice_id = self.slots.insert(slice);
        Ok(Grant { source: id, kind: GrantKind::Exclusive(slice_id) })
    }

    /// Gives a grant back to its source unit. Exclusive slices are removed from the store.
    ///
    /// A release pushing the unreserved capacity above `max_value` by more than `epsilon` is a bookkeeping
    /// error and reported as `Error::Overflow`; smaller overshoots are clamped.
    pub fn release(&mut self, grant: &Grant, holder: Holder, epsilon: f64) -> Result<()> {
        match grant.kind {
            GrantKind::Shared(_) => {
                if let Holder::Job(_) = holder {
                    self.get_mut(grant.source)?.leave_dynamic();
                }
                Ok(())
            }
            GrantKind::Exclusive(slice_id) => {
                let amount = self.get(slice_id)?.get_max_value();
                let source = self.get(grant.source)?;
                let tmp_max_value = source.get_available_value() + amount;
                if tmp_max_value > source.get_max_value() + epsilon {
                    log::error!("Resource overflow after releasing {} of {:?}.", amount, source.get_type());
                    return Err(Error::Overflow { rtype: source.get_type(), released: amount, tmp_max_value, max_value: source.get_max_value() });
                }
                if tmp_max_value > source.get_max_value() {
                    log::debug!("Clamped release overshoot of {} on {:?}.", tmp_max_value - source.get_max_value(), source.get_type());
                }

                self.slots.remove(slice_id);
                self.get_mut(grant.source)?.restore(amount);
                Ok(())
            }
        }
    }
}
