pub mod infrastructure;
pub mod machine;
