pub mod id;
pub mod ordered_float;
