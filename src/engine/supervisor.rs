// src/engine/supervisor.rs
//! Engine lifecycle operations
//!
//! Every way of changing the engine's course (signals, console keys, remote
//! commands) ends up here. [`Supervisor::stop`] is the single teardown
//! path; it runs at most once no matter how many callers race for it.

use crate::cli::console::ConsoleCommand;
use crate::control::ControlCommand;
use crate::engine::state::{EngineSnapshot, EngineState};
use crate::miner::WorkerPool;
use crate::network::PoolHandle;
use crate::utils::platform;
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;

/// What dispatching a command did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// State changed
    Applied,
    /// Already in the requested state, or nothing to do
    NoOp,
    /// Accepted but not implemented
    NotSupported,
}

/// Owns the engine's lifecycle state and the components it tears down
pub struct Supervisor {
    state: EngineState,
    workers: Arc<WorkerPool>,
    pool: OnceLock<PoolHandle>,
    shutdown: watch::Sender<bool>,
    reboot_cmd: Option<String>,
}

impl Supervisor {
    /// Creates a supervisor for a started (or about to start) worker pool
    ///
    /// # Arguments
    /// * `workers` - Worker pool to pause, resume and stop
    /// * `reboot_cmd` - Shell command behind the `REBOOT` command
    pub fn new(workers: Arc<WorkerPool>, reboot_cmd: Option<String>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Supervisor {
            state: EngineState::new(),
            workers,
            pool: OnceLock::new(),
            shutdown,
            reboot_cmd,
        }
    }

    /// Hands over the running pool client so teardown can stop it
    ///
    /// A client attached after teardown began is stopped right away.
    pub fn attach_pool(&self, handle: PoolHandle) {
        if let Err(handle) = self.pool.set(handle) {
            log::warn!("pool client already attached; stopping the extra one");
            handle.stop();
            return;
        }
        if self.is_stopping() {
            if let Some(pool) = self.pool.get() {
                pool.stop();
            }
        }
    }

    /// The attached pool client, if any
    pub fn pool(&self) -> Option<&PoolHandle> {
        self.pool.get()
    }

    /// The worker pool being supervised
    pub fn workers(&self) -> &Arc<WorkerPool> {
        &self.workers
    }

    /// Receiver that flips to `true` once teardown began
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Lifecycle flags plus the active job version
    pub fn snapshot(&self) -> EngineSnapshot {
        self.state.snapshot(self.workers.active_version())
    }

    /// Whether workers are allowed to hash
    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    /// Whether teardown has begun
    pub fn is_stopping(&self) -> bool {
        self.state.is_stopping()
    }

    /// Latest restart intent
    pub fn restart_requested(&self) -> bool {
        self.state.restart_requested()
    }

    /// Pauses or resumes the workers
    pub fn set_enabled(&self, enabled: bool) -> CommandOutcome {
        if self.state.swap_enabled(enabled) == enabled {
            return CommandOutcome::NoOp;
        }
        self.workers.set_enabled(enabled);
        CommandOutcome::Applied
    }

    /// Stops the pool client and the workers, then releases the run loop
    ///
    /// The restart intent is always recorded, so the last caller decides it.
    /// Only the first call tears anything down; returns whether this one did.
    pub fn stop(&self, restart: bool) -> bool {
        self.state.set_restart_requested(restart);
        if !self.state.begin_stopping() {
            log::debug!("stop(restart = {}) while already stopping", restart);
            return false;
        }

        if let Some(pool) = self.pool.get() {
            pool.stop();
        }
        self.workers.stop();
        self.shutdown.send_replace(true);
        true
    }

    /// Stop and ask to be relaunched
    pub fn restart(&self) -> bool {
        self.stop(true)
    }

    /// Stop for good
    pub fn shutdown(&self) -> bool {
        self.stop(false)
    }

    /// Runs the configured reboot command, then shuts down
    ///
    /// Without a configured command nothing happens. The command runs as a
    /// child process awaited on the runtime.
    pub async fn reboot(&self) -> CommandOutcome {
        let Some(command) = &self.reboot_cmd else {
            log::warn!("reboot requested but no reboot command is configured");
            return CommandOutcome::NoOp;
        };
        if let Err(e) = platform::run_reboot_command(command).await {
            log::error!("{}", e);
        }
        self.shutdown();
        CommandOutcome::Applied
    }

    /// Applies a remote command
    pub async fn dispatch(&self, command: ControlCommand) -> CommandOutcome {
        let outcome = match command {
            ControlCommand::Start => self.set_enabled(true),
            ControlCommand::Stop => self.set_enabled(false),
            ControlCommand::Restart => {
                self.restart();
                CommandOutcome::Applied
            }
            ControlCommand::Shutdown => {
                self.shutdown();
                CommandOutcome::Applied
            }
            ControlCommand::Reboot => self.reboot().await,
            ControlCommand::UpdateConfig | ControlCommand::PublishConfig => {
                log::warn!("{} is not supported yet, ignoring", command);
                CommandOutcome::NotSupported
            }
        };
        log::debug!("command {} -> {:?}", command, outcome);
        outcome
    }

    /// Applies a console key
    pub fn on_console(&self, command: ConsoleCommand) {
        match command {
            ConsoleCommand::PrintHashrate => self.workers.print_hashrate(true),
            ConsoleCommand::Pause => {
                if self.set_enabled(false) == CommandOutcome::Applied {
                    log::info!("paused, press 'r' to resume");
                }
            }
            ConsoleCommand::Resume => {
                if self.set_enabled(true) == CommandOutcome::Applied {
                    log::info!("resumed");
                }
            }
            ConsoleCommand::Quit => {
                log::info!("quitting");
                self.shutdown();
            }
        }
    }

    /// Handles a termination signal by name
    pub fn on_signal(&self, name: &str) {
        log::warn!("{} received, exiting", name);
        self.shutdown();
    }
}
