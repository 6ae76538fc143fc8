use crate::api::simulation_config_dto::SimulationConfigDto;
use crate::error::Error;

pub const DEFAULT_PROGRESS_EPSILON: f64 = 1e-10;
pub const DEFAULT_RELEASE_EPSILON: f64 = 1e-10;
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;

/// Numeric tolerances and bookkeeping limits of one simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Leftover operations below this count as done.
    pub progress_epsilon: f64,
    /// Released capacity may exceed the unit maximum by this much before it is an overflow.
    pub release_epsilon: f64,
    /// Executed events kept for inspection, `None` keeps all of them.
    pub history_limit: Option<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig { progress_epsilon: DEFAULT_PROGRESS_EPSILON, release_epsilon: DEFAULT_RELEASE_EPSILON, history_limit: Some(DEFAULT_HISTORY_LIMIT) }
    }
}

impl TryFrom<SimulationConfigDto> for SimulationConfig {
    type Error = Error;

    fn try_from(dto: SimulationConfigDto) -> Result<Self, Self::Error> {
        for (name, value) in [("progressEpsilon", dto.progress_epsilon), ("releaseEpsilon", dto.release_epsilon)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::InvalidConfig(format!("{} must be a non-negative number, got {}", name, value)));
            }
        }
        Ok(SimulationConfig { progress_epsilon: dto.progress_epsilon, release_epsilon: dto.release_epsilon, history_limit: dto.history_limit })
    }
}
