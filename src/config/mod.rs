// src/config/mod.rs
//! Configuration management
//!
//! TOML configuration covering worker threads, affinity and priority, the
//! ordered pool failover list and the optional control channel. Everything
//! here is read-only once the engine starts.

/// Core configuration implementation
pub mod config;

// Re-export key items for easy access
pub use config::Config;

use crate::utils::error::MinerError;
use std::path::PathBuf;

/// Loads and validates configuration from a TOML file
pub fn load(path: impl Into<PathBuf>) -> Result<Config, MinerError> {
    Config::load(path)
}

/// Generates a commented configuration template
///
/// # Arguments
/// * `control` - Whether to include the control channel section
pub fn generate_template(control: bool) -> String {
    Config::generate_template(control)
}
