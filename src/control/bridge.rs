// src/control/bridge.rs
//! One-slot command hand-off
//!
//! The control client produces commands on its own task; only the engine's
//! run loop consumes them. The channel holds at most one undelivered
//! command, so a producer waits until the previous one was taken.

use crate::control::command::ControlCommand;
use crate::utils::error::MinerError;
use tokio::sync::mpsc;

/// Producer side, cloneable
#[derive(Debug, Clone)]
pub struct CommandSender(mpsc::Sender<ControlCommand>);

/// Consumer side, owned by the run loop
#[derive(Debug)]
pub struct CommandReceiver(mpsc::Receiver<ControlCommand>);

/// Creates a connected sender/receiver pair
pub fn command_bridge() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (CommandSender(tx), CommandReceiver(rx))
}

impl CommandSender {
    /// Hands `command` over, waiting while the slot is occupied
    ///
    /// # Errors
    /// Returns `MinerError::ChannelError` once the receiver is gone.
    pub async fn send(&self, command: ControlCommand) -> Result<(), MinerError> {
        self.0.send(command).await?;
        Ok(())
    }

    /// Whether the run loop stopped listening
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

impl CommandReceiver {
    /// Next command; `None` once every sender is dropped
    pub async fn recv(&mut self) -> Option<ControlCommand> {
        self.0.recv().await
    }

    /// Stops accepting commands; pending one stays readable
    pub fn close(&mut self) {
        self.0.close();
    }
}
