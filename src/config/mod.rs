//! Configuration management
//!
//! Environment-driven settings for the node process: listen address,
//! mining address, data directory, and seed peers.

pub mod settings;

pub use settings::{Config, GLOBAL_CONFIG};
