// src/miner/mod.rs
//! Core mining functionality
//!
//! - Hash engines and the pre-flight self-test
//! - Jobs, targets, solutions and per-unit nonce ranges
//! - The worker pool and its per-thread hash loop

/// Hash engine implementations and the pre-flight self-test
pub mod algorithm;

/// Jobs, targets and solutions
pub mod job;

/// Per-unit nonce ranges
pub mod nonce;

/// Worker pool: thread lifecycle, job publication, pause/resume
pub mod scheduler;

/// Per-thread hash loop
pub mod worker;

// Re-export main components for cleaner imports
pub use self::algorithm::HashEngine;
pub use self::job::{Job, Solution, Target};
pub use self::nonce::NonceRange;
pub use self::scheduler::{UnitFault, WorkerPool};
pub use self::worker::Worker;
