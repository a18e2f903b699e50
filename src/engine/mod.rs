// src/engine/mod.rs
//! Engine supervisor
//!
//! - `state`: lifecycle flags (enabled, restart requested, stopping)
//! - `supervisor`: lifecycle operations and command dispatch
//! - `runner`: composition root and the control-context run loop

/// Lifecycle flags
pub mod state;

/// Lifecycle operations and command dispatch
pub mod supervisor;

/// Composition root and run loop
pub mod runner;

pub use runner::{Engine, ExitStatus, FATAL_EXIT_CODE, RESTART_EXIT_CODE, run};
pub use state::{EngineSnapshot, EngineState};
pub use supervisor::{CommandOutcome, Supervisor};
