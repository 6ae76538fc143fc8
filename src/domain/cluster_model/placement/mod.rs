pub mod placement_policy;
