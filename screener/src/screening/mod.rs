pub mod batching;
pub mod classifier;
pub mod dedup;
pub mod scheduler;
