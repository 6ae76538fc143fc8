pub mod infrastructure_dto;
pub mod simulation_config_dto;
