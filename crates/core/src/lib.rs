pub mod ladder;
pub mod types;
