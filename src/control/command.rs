// src/control/command.rs
//! Remote lifecycle commands
//!
//! The closed set of commands a fleet-management server can send, with the
//! upper-case wire tags they travel as.

use std::fmt;
use std::str::FromStr;

/// Lifecycle command delivered by the fleet-management endpoint
///
/// Carries nothing beyond its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    /// Resume hashing
    Start,
    /// Pause hashing; threads stay alive
    Stop,
    /// Reload configuration (not supported yet)
    UpdateConfig,
    /// Stop and ask the outer supervisor to relaunch
    Restart,
    /// Stop without restart
    Shutdown,
    /// Run the configured reboot command, then shut down
    Reboot,
    /// Upload the local configuration (not supported yet)
    PublishConfig,
}

impl ControlCommand {
    /// Every command, in wire order
    pub const ALL: [ControlCommand; 7] = [
        ControlCommand::Start,
        ControlCommand::Stop,
        ControlCommand::UpdateConfig,
        ControlCommand::Restart,
        ControlCommand::Shutdown,
        ControlCommand::Reboot,
        ControlCommand::PublishConfig,
    ];

    /// Tag used on the wire
    pub fn tag(&self) -> &'static str {
        match self {
            ControlCommand::Start => "START",
            ControlCommand::Stop => "STOP",
            ControlCommand::UpdateConfig => "UPDATE_CONFIG",
            ControlCommand::Restart => "RESTART",
            ControlCommand::Shutdown => "SHUTDOWN",
            ControlCommand::Reboot => "REBOOT",
            ControlCommand::PublishConfig => "PUBLISH_CONFIG",
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ControlCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        ControlCommand::ALL
            .into_iter()
            .find(|cmd| cmd.tag().eq_ignore_ascii_case(tag))
            .ok_or_else(|| format!("Unknown control command: {}", s))
    }
}
