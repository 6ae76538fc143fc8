use crate::api::infrastructure_dto::InfrastructureDto;
use crate::api::simulation_config_dto::SimulationConfigDto;
use crate::domain::simulator::config::SimulationConfig;
use crate::error::Result;
use crate::loader::parser::parse_json_file;

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Reads simulation settings from a JSON file.
pub fn load_config(file_path: &str) -> Result<SimulationConfig> {
    let dto = parse_json_file::<SimulationConfigDto>(file_path)?;
    log::info!("Simulation config {} parsed successfully.", file_path);

    SimulationConfig::try_from(dto)
}

/// Reads an infrastructure description from a JSON file, see `SimulationContext::add_machines_from_dto`.
pub fn load_infrastructure(file_path: &str) -> Result<InfrastructureDto> {
    let dto = parse_json_file::<InfrastructureDto>(file_path)?;
    log::info!("Infrastructure {} parsed successfully: {} machines.", file_path, dto.machines.len());
    Ok(dto)
}
