pub mod client;
pub mod config;
pub mod daemon;
pub mod error;
pub mod events;
pub mod executor;
pub mod infrastructure;
pub mod queue;
pub mod registry;
pub mod tasks;
