use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureDto {
    pub machines: Vec<MachineDto>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDto {
    pub name: String,
    pub cores: usize,
    /// Operations per second of one core.
    pub core_freq: f64,
    pub ram: f64,
    #[serde(default)]
    pub gpus: Vec<GpuDto>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuDto {
    pub cuda_cores: f64,
    #[serde(default = "default_gpu_freq")]
    pub freq: f64,
}

fn default_gpu_freq() -> f64 {
    1.0
}
