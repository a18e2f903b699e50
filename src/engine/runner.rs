// src/engine/runner.rs
//! Composition root and control-context run loop
//!
//! [`Engine::start`] wires the worker pool, pool client and control client
//! together; [`Engine::run`] is the one place signals, console keys, remote
//! commands, unit faults and timers are handled.

use crate::cli::console::{self, ConsoleCommand};
use crate::config::Config;
use crate::control::{
    ClientStatus, CommandReceiver, CommandSender, ControlClient, StatusProvider, command_bridge,
};
use crate::engine::supervisor::Supervisor;
use crate::miner::algorithm::{self, HashEngine};
use crate::miner::{UnitFault, WorkerPool};
use crate::network::{PoolClient, PoolSettings};
use crate::stats::{ShareCounters, StatsReporter};
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// How often unit hash counters are sampled
pub const HASHRATE_TICK: Duration = Duration::from_millis(500);

/// Exit code asking an outer supervisor to relaunch (`EINTR`)
pub const RESTART_EXIT_CODE: i32 = 4;

/// Exit code for fatal startup errors (`EINVAL`)
pub const FATAL_EXIT_CODE: i32 = 22;

/// Limit for background tasks to wind down after teardown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How the run loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Stopped for good
    Shutdown,
    /// Stopped and asking to be relaunched
    Restart,
}

impl ExitStatus {
    /// Process exit code for this outcome
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Shutdown => 0,
            ExitStatus::Restart => RESTART_EXIT_CODE,
        }
    }
}

/// Builds the hash engine, self-tests it and runs the miner to completion
///
/// Startup errors are returned before any worker or network activity.
pub async fn run(config: Config) -> Result<ExitStatus, MinerError> {
    let algorithm = config.algorithm_type()?;
    let hw_accel = config.hw_accel;
    let skip_self_check = config.skip_self_check;

    // RandomX dataset setup takes a while; keep it off the reactor.
    let engine = tokio::task::spawn_blocking(move || {
        let engine = algorithm::create(algorithm, hw_accel)?;
        algorithm::preflight(engine.as_ref(), skip_self_check)?;
        Ok::<_, MinerError>(engine)
    })
    .await??;

    let interactive = io::IsTerminal::is_terminal(&io::stdin());
    Ok(Engine::start(config, engine)?
        .with_console(interactive)
        .with_signals(true)
        .run()
        .await)
}

/// Status document source for the control client
struct EngineStatus {
    worker_id: String,
    algorithm: AlgorithmType,
    supervisor: Arc<Supervisor>,
    counters: ShareCounters,
}

impl StatusProvider for EngineStatus {
    fn status(&self) -> ClientStatus {
        let workers = self.supervisor.workers();
        let rate = workers.hashrate();
        let shares = self.counters.get();

        ClientStatus {
            client_id: self.worker_id.clone(),
            current_status: if self.supervisor.is_enabled() { "RUNNING" } else { "PAUSED" }.into(),
            current_pool: self.supervisor.pool().and_then(|pool| pool.current_pool()),
            current_algo_name: self.algorithm.to_string(),
            hashrate_short: rate.short,
            hashrate_medium: rate.medium,
            hashrate_long: rate.large,
            hashrate_highest: workers.highest_hashrate(),
            shares_good: shares.shares_accepted,
            shares_total: shares.shares_total(),
            hashes_total: workers.total_hashes(),
            current_threads: workers.active_units(),
            uptime: shares.uptime.as_secs(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// A started miner waiting for its run loop
pub struct Engine {
    supervisor: Arc<Supervisor>,
    reporter: StatsReporter,
    faults: mpsc::UnboundedReceiver<UnitFault>,
    commands: CommandReceiver,
    command_tx: CommandSender,
    control: Option<JoinHandle<()>>,
    print_time: u64,
    console: bool,
    signals: bool,
}

impl Engine {
    /// Starts workers, then the pool client and the control client
    ///
    /// `engine` must already have passed its pre-flight check. Must be
    /// called inside a tokio runtime.
    pub fn start(config: Config, engine: Arc<dyn HashEngine>) -> Result<Self, MinerError> {
        let algorithm = config.algorithm_type()?;
        let threads = config.effective_threads();

        log::info!(
            "starting {} v{}: {} threads, algo {}, {} pool(s), control {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            threads,
            algorithm,
            config.pools.len(),
            config.control.as_ref().map_or("off", |c| c.url.as_str()),
        );

        let (solution_tx, solution_rx) = mpsc::unbounded_channel();
        let (fault_tx, faults) = mpsc::unbounded_channel();
        let workers = Arc::new(WorkerPool::new(engine, solution_tx, fault_tx));
        workers.start(threads, config.cpu_affinity, config.cpu_priority)?;

        let reboot_cmd = config.control.as_ref().and_then(|c| c.reboot_cmd.clone());
        let supervisor = Arc::new(Supervisor::new(Arc::clone(&workers), reboot_cmd));
        let reporter = StatsReporter::new();

        if config.pools.is_empty() {
            log::warn!("No pool URL supplied, but control server configured. Waiting for commands.");
        } else {
            let settings = PoolSettings::from_config(&config)?;
            let client = PoolClient::new(
                &config.pools,
                settings,
                Arc::clone(&workers),
                solution_rx,
                reporter.share_sender(),
            );
            supervisor.attach_pool(client.connect());
        }

        let (command_tx, commands) = command_bridge();
        let control = match &config.control {
            Some(control) => {
                let status = Arc::new(EngineStatus {
                    worker_id: control.worker_id.clone(),
                    algorithm,
                    supervisor: Arc::clone(&supervisor),
                    counters: reporter.counters(),
                });
                match ControlClient::new(control.clone(), status, command_tx.clone()) {
                    Ok(client) => Some(tokio::spawn(client.run(supervisor.subscribe()))),
                    Err(e) => {
                        log::warn!("control channel disabled: {}", e);
                        None
                    }
                }
            }
            None => {
                log::warn!("Please configure a control url and restart. Remote control is deactivated.");
                None
            }
        };

        Ok(Engine {
            supervisor,
            reporter,
            faults,
            commands,
            command_tx,
            control,
            print_time: config.print_time,
            console: false,
            signals: false,
        })
    }

    /// Read single-key commands from stdin while running
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    /// Shut down on SIGHUP, SIGINT and SIGTERM while running
    pub fn with_signals(mut self, signals: bool) -> Self {
        self.signals = signals;
        self
    }

    /// Shared handle on the lifecycle operations
    pub fn supervisor(&self) -> Arc<Supervisor> {
        Arc::clone(&self.supervisor)
    }

    /// Another producer for the command bridge
    pub fn command_sender(&self) -> CommandSender {
        self.command_tx.clone()
    }

    /// Handles events until the supervisor stops the engine
    pub async fn run(mut self) -> ExitStatus {
        let mut signals = if self.signals {
            match Signals::new() {
                Ok(signals) => Some(signals),
                Err(e) => {
                    log::warn!("signal handlers not installed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let (console_tx, mut console_rx) = mpsc::channel::<ConsoleCommand>(4);
        if self.console {
            match console::spawn_reader(console_tx.clone()) {
                Ok(_) => log::info!("press 'h' for hashrate, 'p' to pause, 'r' to resume, 'q' to quit"),
                Err(e) => log::warn!("console disabled: {}", e),
            }
        }

        let mut released = self.supervisor.subscribe();
        let mut tick = time::interval(HASHRATE_TICK);
        let report_every = Duration::from_secs(self.print_time.max(1));
        let mut report = time::interval_at(Instant::now() + report_every, report_every);

        while !self.supervisor.is_stopping() {
            tokio::select! {
                name = next_signal(&mut signals) => self.supervisor.on_signal(name),
                Some(command) = self.commands.recv() => {
                    self.supervisor.dispatch(command).await;
                }
                Some(key) = console_rx.recv() => self.supervisor.on_console(key),
                Some(fault) = self.faults.recv() => {
                    let workers = self.supervisor.workers();
                    log::warn!(
                        "worker pool degraded: {}/{} units active (thread #{}: {})",
                        workers.active_units(),
                        workers.thread_count(),
                        fault.index,
                        fault.reason
                    );
                }
                _ = tick.tick() => self.supervisor.workers().tick_hashrate(),
                _ = report.tick(), if self.print_time > 0 => {
                    let workers = self.supervisor.workers();
                    workers.print_hashrate(false);
                    self.reporter.log_summary(workers.hashrate());
                }
                _ = released.changed() => {}
            }
        }
        drop(console_tx);

        // Lets a control client blocked on the bridge see it closed.
        self.commands.close();
        if let Some(pool) = self.supervisor.pool() {
            if time::timeout(DRAIN_TIMEOUT, pool.join()).await.is_err() {
                log::warn!("pool client did not stop in time");
            }
        }
        if let Some(mut control) = self.control.take() {
            if time::timeout(DRAIN_TIMEOUT, &mut control).await.is_err() {
                control.abort();
            }
        }

        let status = if self.supervisor.restart_requested() {
            ExitStatus::Restart
        } else {
            ExitStatus::Shutdown
        };
        log::info!("exiting ({:?})", status);
        status
    }
}

/// Termination signals the run loop listens for
struct Signals {
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl Signals {
    #[cfg(unix)]
    fn new() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Signals {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    fn new() -> io::Result<Self> {
        Ok(Signals {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> &'static str {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        "SIGINT"
    }
}

async fn next_signal(signals: &mut Option<Signals>) -> &'static str {
    match signals {
        Some(signals) => signals.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlCommand;
    use crate::control::client::testing::http_server;
    use crate::miner::algorithm::testing::{FaultyEngine, NonceEngine};
    use crate::miner::job::MIN_BLOB_SIZE;
    use serde_json::{Value, json};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Pool answering login with one job and every submit with OK
    async fn tcp_pool(listener: TcpListener, seen: mpsc::UnboundedSender<Value>) {
        let Ok((stream, _)) = listener.accept().await else { return };
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        // Digest tails of the test engine equal the nonce, so only 0..3 qualify.
        let job = json!({
            "job_id": "j1",
            "blob": hex::encode(vec![0u8; MIN_BLOB_SIZE]),
            "target": "0300000000000000"
        });
        while let Ok(Some(line)) = lines.next_line().await {
            let req: Value = serde_json::from_str(&line).unwrap();
            let reply = match req["method"].as_str() {
                Some("login") => json!({"id": req["id"], "result": {"id": "s", "job": job, "status": "OK"}}),
                Some("submit") => {
                    let _ = seen.send(req["params"].clone());
                    json!({"id": req["id"], "result": {"status": "OK"}})
                }
                _ => continue,
            };
            if write_half.write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
                return;
            }
        }
    }

    fn pool_config(url: &str, threads: usize) -> Config {
        let text = format!(
            "threads = {}\nprint_time = 0\nretry_pause = 1\n[[pools]]\nurl = \"{}\"\nuser = \"w\"\n",
            threads, url
        );
        let config = Config::from_toml(&text).unwrap();
        config.validate().unwrap();
        config
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ExitStatus::Shutdown.code(), 0);
        assert_eq!(ExitStatus::Restart.code(), 4);
        assert_eq!(FATAL_EXIT_CODE, 22);
    }

    #[tokio::test]
    async fn mines_pool_job_then_restarts_on_command() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("stratum+tcp://127.0.0.1:{}", listener.local_addr().unwrap().port());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(tcp_pool(listener, seen_tx));

        let engine = Engine::start(pool_config(&url, 2), Arc::new(NonceEngine)).unwrap();
        let supervisor = engine.supervisor();
        let commands = engine.command_sender();
        let running = tokio::spawn(engine.run());

        let params = time::timeout(Duration::from_secs(10), seen_rx.recv()).await.unwrap().unwrap();
        assert_eq!(params["job_id"], "j1");
        assert_eq!(supervisor.workers().active_units(), 2);

        commands.send(ControlCommand::Stop).await.unwrap();
        commands.send(ControlCommand::UpdateConfig).await.unwrap();
        commands.send(ControlCommand::Restart).await.unwrap();

        let status = time::timeout(Duration::from_secs(10), running).await.unwrap().unwrap();
        assert_eq!(status, ExitStatus::Restart);
        assert!(!supervisor.is_enabled());
        assert_eq!(supervisor.workers().active_units(), 0);
    }

    #[tokio::test]
    async fn control_channel_alone_can_shut_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
        let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
        let body = json!({"control_command": {"command": "SHUTDOWN"}}).to_string();
        tokio::spawn(http_server(listener, body, seen_tx));

        let text = format!(
            "threads = 1\nprint_time = 0\n[control]\nurl = \"{}\"\nworker_id = \"t\"\nupdate_interval = 1\n",
            url
        );
        let config = Config::from_toml(&text).unwrap();
        config.validate().unwrap();

        let engine = Engine::start(config, Arc::new(NonceEngine)).unwrap();
        let supervisor = engine.supervisor();
        assert!(supervisor.pool().is_none());

        let status = time::timeout(Duration::from_secs(10), engine.run()).await.unwrap();
        assert_eq!(status, ExitStatus::Shutdown);
    }

    #[tokio::test]
    async fn faulty_unit_degrades_without_stopping() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("stratum+tcp://127.0.0.1:{}", listener.local_addr().unwrap().port());
        let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(tcp_pool(listener, seen_tx));

        // Unit 1's region starts at 2^31, which the engine refuses to hash.
        let engine = Engine::start(pool_config(&url, 2), Arc::new(FaultyEngine { fail_at: 1 << 31 })).unwrap();
        let supervisor = engine.supervisor();
        let running = tokio::spawn(engine.run());

        for _ in 0..500 {
            if supervisor.workers().active_units() == 1 {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(supervisor.workers().active_units(), 1);
        assert!(!supervisor.is_stopping());

        supervisor.shutdown();
        let status = time::timeout(Duration::from_secs(10), running).await.unwrap().unwrap();
        assert_eq!(status, ExitStatus::Shutdown);
    }
}
