pub mod config;
pub mod manifest;
pub mod pipeline;
pub mod watch;
