//! XMR CC Miner - remotely controllable Monero miner in Rust
//!
//! This crate provides a Monero (XMR) miner whose lifecycle can be driven
//! from a fleet-management server:
//! - Multiple mining algorithms (RandomX, CryptoNight variants)
//! - Pool failover across an ordered list of stratum endpoints
//! - Pause, resume, restart, shutdown and reboot over a control channel
//! - Windowed hashrate and share reporting

#![warn(missing_docs)]
#![deny(unsafe_code)]

/// Miner core implementation including algorithms and the worker pool
pub mod miner;

/// Pool protocol client with failover
pub mod network;

/// Remote control channel and command bridge
pub mod control;

/// Engine supervisor and run loop
pub mod engine;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use control::{ControlCommand, ControlConfig};
pub use engine::{CommandOutcome, Engine, ExitStatus, Supervisor};
pub use miner::{HashEngine, Job, NonceRange, Solution, Target, WorkerPool};
pub use network::{PoolClient, PoolConfig, PoolHandle};
pub use stats::{HardwareStats, MiningStats, StatsReporter};
pub use types::AlgorithmType;
pub use utils::{MinerError, init_logging};
