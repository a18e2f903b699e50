// src/utils/mod.rs
//! Utilities module for common functionality
//!
//! Error handling, logging and the handful of OS primitives (affinity,
//! priority, reboot) the engine needs.

/// Error types and handling utilities
///
/// Contains the [`MinerError`] enum which defines all possible error conditions
/// for the miner, along with conversion implementations.
pub mod error;

/// Logging configuration and utilities
pub mod logging;

/// CPU affinity, thread priority and reboot command helpers
pub mod platform;

// Re-export for easier access
pub use error::MinerError;
pub use logging::init_logging;
