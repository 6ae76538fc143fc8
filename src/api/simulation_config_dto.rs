use serde::{Deserialize, Serialize};

use crate::domain::simulator::config::{DEFAULT_HISTORY_LIMIT, DEFAULT_PROGRESS_EPSILON, DEFAULT_RELEASE_EPSILON};

fn default_progress_epsilon() -> f64 {
    DEFAULT_PROGRESS_EPSILON
}

fn default_release_epsilon() -> f64 {
    DEFAULT_RELEASE_EPSILON
}

fn default_history_limit() -> Option<usize> {
    Some(DEFAULT_HISTORY_LIMIT)
}

/// JSON form of the simulation settings. An explicit `"historyLimit": null` keeps the whole history.
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfigDto {
    #[serde(default = "default_progress_epsilon")]
    pub progress_epsilon: f64,
    #[serde(default = "default_release_epsilon")]
    pub release_epsilon: f64,
    #[serde(default = "default_history_limit")]
    pub history_limit: Option<usize>,
}
