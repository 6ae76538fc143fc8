pub mod resource;
pub mod resource_request;
pub mod resource_store;
pub mod resources_holder;
