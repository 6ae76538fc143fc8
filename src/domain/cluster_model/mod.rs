pub mod bin_packing;
pub mod cluster_model;
pub mod job;
pub mod machine;
pub mod placement;
pub mod resource;
pub mod scheduler;
pub mod utils;
