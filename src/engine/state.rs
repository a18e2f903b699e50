// src/engine/state.rs
//! Engine lifecycle flags
//!
//! Written only by the supervisor; everyone else reads snapshots.

use std::sync::atomic::{AtomicBool, Ordering};

/// Engine lifecycle flags
///
/// Written only by the [`Supervisor`](crate::engine::Supervisor); everything
/// else reads snapshots.
#[derive(Debug)]
pub struct EngineState {
    enabled: AtomicBool,
    restart_requested: AtomicBool,
    stopping: AtomicBool,
}

/// Point-in-time copy of [`EngineState`] plus the active job version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSnapshot {
    /// Workers are allowed to hash
    pub enabled: bool,
    /// Exit should ask for a relaunch
    pub restart_requested: bool,
    /// Teardown has begun
    pub stopping: bool,
    /// Version of the job the workers hash, `0` when idle
    pub active_version: u64,
}

impl Default for EngineState {
    fn default() -> Self {
        EngineState {
            enabled: AtomicBool::new(true),
            restart_requested: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        }
    }
}

impl EngineState {
    /// Enabled, no restart, not stopping
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether workers are allowed to hash
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Stores `enabled`, returning the previous value
    pub(crate) fn swap_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::AcqRel)
    }

    /// Latest restart intent
    pub fn restart_requested(&self) -> bool {
        self.restart_requested.load(Ordering::Acquire)
    }

    pub(crate) fn set_restart_requested(&self, restart: bool) {
        self.restart_requested.store(restart, Ordering::Release);
    }

    /// Whether teardown has begun
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Marks teardown as begun; `true` only for the first caller
    pub(crate) fn begin_stopping(&self) -> bool {
        !self.stopping.swap(true, Ordering::AcqRel)
    }

    /// Copies the flags together with `active_version`
    pub fn snapshot(&self, active_version: u64) -> EngineSnapshot {
        EngineSnapshot {
            enabled: self.is_enabled(),
            restart_requested: self.restart_requested(),
            stopping: self.is_stopping(),
            active_version,
        }
    }
}
