pub mod bin_packing_queue;
pub mod bins;
pub mod ordered_timeline_bin;
pub mod task;
pub mod timeline;
