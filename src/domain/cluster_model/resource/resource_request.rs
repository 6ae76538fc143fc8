use crate::domain::cluster_model::resource::resource::ResourceType;
use crate::error::{Error, Result};

/// Sentinel for "as much as the unit offers".
pub const INF: f64 = f64::INFINITY;

/// A demand for one unit of a resource type.
///
/// Three shapes exist:
/// - `INF` + shared: fair share of a unit, the effective rate changes as other users come and go.
/// - finite value: exclusive carve-out of exactly `value`, never shared.
/// - `INF` + exclusive: carve out whatever the unit has left and own it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceRequest {
    pub rtype: ResourceType,
    pub value: f64,
    pub shared: bool,
}

impl ResourceRequest {
    /// Builds a request. A finite value always yields an exclusive request.
    ///
    /// # Returns
    /// `Error::InvalidRequest` if `value` is not positive (or NaN).
    pub fn new(rtype: ResourceType, value: f64, shared: bool) -> Result<Self> {
        if !(value > 0.0) {
            return Err(Error::InvalidRequest { rtype, value });
        }
        let shared = shared && value == INF;
        Ok(ResourceRequest { rtype, value, shared })
    }

    /// Fair share of one unit of `rtype`.
    pub fn shared(rtype: ResourceType) -> Self {
        ResourceRequest { rtype, value: INF, shared: true }
    }

    /// Fixed exclusive amount of `rtype`.
    pub fn exclusive(rtype: ResourceType, value: f64) -> Result<Self> {
        Self::new(rtype, value, false)
    }

    /// Whole remaining capacity of one unit of `rtype`, owned exclusively.
    pub fn dedicated(rtype: ResourceType) -> Self {
        ResourceRequest { rtype, value: INF, shared: false }
    }

    pub fn is_infinite(&self) -> bool {
        self.value == INF
    }
}
