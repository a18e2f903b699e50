// src/cli/console.rs
//! Single-key console commands
//!
//! Keys are read from stdin as they arrive (line buffered by the terminal),
//! so `h` followed by Enter prints the hashrate.

use std::io::{self, Read};
use std::thread::JoinHandle;
use tokio::sync::mpsc;

/// What a console key asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `h`: per-thread hashrate table
    PrintHashrate,
    /// `p`: pause hashing
    Pause,
    /// `r`: resume hashing
    Resume,
    /// `q` or Ctrl-C: shut down
    Quit,
}

impl ConsoleCommand {
    /// Maps a key to a command; other keys are ignored
    pub fn from_key(key: u8) -> Option<Self> {
        match key {
            b'h' | b'H' => Some(ConsoleCommand::PrintHashrate),
            b'p' | b'P' => Some(ConsoleCommand::Pause),
            b'r' | b'R' => Some(ConsoleCommand::Resume),
            b'q' | b'Q' | 3 => Some(ConsoleCommand::Quit),
            _ => None,
        }
    }
}

/// Reads stdin on a dedicated thread and forwards recognized keys
///
/// The thread ends when stdin closes or the receiver is dropped.
pub fn spawn_reader(commands: mpsc::Sender<ConsoleCommand>) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            for byte in io::stdin().lock().bytes() {
                let Ok(byte) = byte else { break };
                let Some(command) = ConsoleCommand::from_key(byte) else {
                    continue;
                };
                if commands.blocking_send(command).is_err() {
                    break;
                }
            }
            log::debug!("console reader stopped");
        })
}
