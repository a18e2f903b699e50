// src/control/mod.rs
//! Remote control channel
//!
//! A fleet-management server can pause, resume, restart, shut down or
//! reboot the miner. Commands travel from the HTTP client's task to the
//! engine run loop over a one-slot bridge; the run loop alone applies them.

/// Command tags
pub mod command;

/// One-slot command hand-off
pub mod bridge;

/// HTTP status/command client
pub mod client;

// Re-export main components for cleaner imports
pub use bridge::{CommandReceiver, CommandSender, command_bridge};
pub use client::{ClientStatus, ControlClient, ControlConfig, StatusProvider};
pub use command::ControlCommand;
