// src/network/pool.rs

//! Mining pool client implementation
//!
//! Keeps one connection to one of the configured pools, hands every job it
//! receives to the [`WorkerPool`] with a fresh version, submits solutions
//! back and fails over to the next pool on any transport or protocol error.
use crate::config::Config;
use crate::miner::job::Solution;
use crate::miner::scheduler::WorkerPool;
use crate::network::failover::{Backoff, FailoverPolicy, PoolEndpoint};
use crate::network::protocol::{self, JobParams, LOGIN_ID, PoolMessage};
use crate::network::transport::Connection;
use crate::stats::ShareResult;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Interval between keepalive pings on an idle connection
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for connecting to a mining pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool connection URL (e.g., "stratum+tcp://pool.example.com:3333")
    pub url: String,
    /// Wallet address or pool username
    pub user: String,
    /// Worker password (often "x" if not required)
    #[serde(default = "default_pass")]
    pub pass: String,
    /// Send keepalive pings while connected
    #[serde(default = "default_keepalive")]
    pub keepalive: bool,
}

fn default_pass() -> String {
    "x".into()
}

fn default_keepalive() -> bool {
    true
}

/// Connection state of the pool client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PoolState {
    /// No connection and no attempt in progress
    #[default]
    Disconnected,
    /// Opening a connection and logging in
    Connecting,
    /// Logged in and receiving jobs
    Mining,
    /// Waiting out the backoff before trying the next pool
    FailingOver,
    /// Stopped for good; no further attempts
    Stopped,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolState::Disconnected => "disconnected",
            PoolState::Connecting => "connecting",
            PoolState::Mining => "mining",
            PoolState::FailingOver => "failing over",
            PoolState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Timing and algorithm settings for the pool client
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Algorithm assumed for jobs that do not name one
    pub algorithm: AlgorithmType,
    /// Limit for opening a connection
    pub connect_timeout: Duration,
    /// Silence after which a connection is declared dead
    pub response_timeout: Duration,
    /// Keepalive ping interval
    pub keepalive_interval: Duration,
    /// Base failover backoff
    pub retry_pause: Duration,
    /// Failover backoff cap
    pub max_retry_pause: Duration,
}

impl PoolSettings {
    /// Settings taken from the loaded configuration
    pub fn from_config(config: &Config) -> Result<Self, MinerError> {
        Ok(PoolSettings {
            algorithm: config.algorithm_type()?,
            connect_timeout: Duration::from_secs(config.connect_timeout),
            response_timeout: Duration::from_secs(config.response_timeout),
            keepalive_interval: KEEPALIVE_INTERVAL,
            retry_pause: config.retry_pause(),
            max_retry_pause: config.max_retry_pause(),
        })
    }
}

/// State the client shares with its handle
#[derive(Debug, Default)]
struct PoolStatus {
    state: Mutex<PoolState>,
    pool: Mutex<Option<String>>,
}

/// Client for communicating with a mining pool
///
/// Created idle; [`PoolClient::connect`] moves it onto the runtime and
/// returns the [`PoolHandle`] used to observe and stop it.
pub struct PoolClient {
    policy: FailoverPolicy,
    settings: PoolSettings,
    workers: Arc<WorkerPool>,
    solutions: UnboundedReceiver<Solution>,
    shares: crossbeam_channel::Sender<ShareResult>,
    status: Arc<PoolStatus>,
    /// Connection attempts so far
    epoch: u64,
    /// Last job version handed to the workers (process-wide)
    version: u64,
    /// Version and difficulty of the job solutions are accepted for
    current: Option<(u64, u64)>,
    next_id: u64,
    pending: HashMap<u64, (u64, Instant)>,
    accepted: u64,
    rejected: u64,
}

/// Why a session ended without an error
enum SessionEnd {
    Stopped,
}

impl PoolClient {
    /// Creates a new PoolClient instance
    ///
    /// # Arguments
    /// * `pools` - Ordered failover list; invalid entries are skipped
    /// * `settings` - Timeouts, backoff and default algorithm
    /// * `workers` - Worker pool that receives jobs
    /// * `solutions` - Solutions found by the workers
    /// * `shares` - Where accept/reject results are reported
    pub fn new(
        pools: &[PoolConfig],
        settings: PoolSettings,
        workers: Arc<WorkerPool>,
        solutions: UnboundedReceiver<Solution>,
        shares: crossbeam_channel::Sender<ShareResult>,
    ) -> Self {
        let backoff = Backoff::new(settings.retry_pause, settings.max_retry_pause);
        PoolClient {
            policy: FailoverPolicy::new(pools, backoff),
            settings,
            workers,
            solutions,
            shares,
            status: Arc::new(PoolStatus::default()),
            epoch: 0,
            version: 0,
            current: None,
            next_id: LOGIN_ID + 1,
            pending: HashMap::new(),
            accepted: 0,
            rejected: 0,
        }
    }

    /// Starts connecting in the background
    ///
    /// With no valid pool in the list nothing is spawned: the engine stays
    /// idle and a warning is logged. Must be called inside a tokio runtime.
    pub fn connect(self) -> PoolHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let status = Arc::clone(&self.status);

        let task = if self.policy.is_empty() {
            log::warn!("no valid pool configured, workers stay idle");
            None
        } else {
            log::info!("{} pool(s) in failover list", self.policy.len());
            Some(tokio::spawn(self.run(stop_rx)))
        };

        PoolHandle {
            stop: stop_tx,
            status,
            task: Mutex::new(task),
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            let Some(endpoint) = self.policy.current().cloned() else {
                break;
            };
            self.epoch += 1;
            self.set_state(PoolState::Connecting, Some(endpoint.url().to_string()));

            let outcome = self.session(&endpoint, &mut shutdown).await;
            self.drop_connection_state();

            match outcome {
                Ok(SessionEnd::Stopped) => break,
                Err(e) => {
                    if *shutdown.borrow() {
                        break;
                    }
                    log::warn!("[{}] {}", endpoint.label(), e);
                }
            }

            let delay = self.policy.on_failure();
            self.set_state(PoolState::FailingOver, None);
            if let Some(next) = self.policy.current() {
                log::info!(
                    "retry in {:.1}s with pool #{} {}",
                    delay.as_secs_f64(),
                    next.ordinal,
                    next.url()
                );
            }

            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
        }

        self.set_state(PoolState::Stopped, None);
        log::info!("pool client stopped");
    }

    /// One connection: connect, log in, then mine until it breaks
    async fn session(
        &mut self,
        endpoint: &PoolEndpoint,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, MinerError> {
        let label = endpoint.label();
        log::info!("[{}] connecting (pool #{}, epoch {})", label, endpoint.ordinal, self.epoch);

        let mut conn = tokio::select! {
            conn = time::timeout(self.settings.connect_timeout, Connection::open(endpoint.url())) => conn??,
            _ = shutdown.changed() => return Ok(SessionEnd::Stopped),
        };

        let login = protocol::login_request(&endpoint.config.user, &endpoint.config.pass, self.settings.algorithm);
        conn.send_text(login.to_string()).await?;

        let result = tokio::select! {
            result = time::timeout(self.settings.response_timeout, wait_for_login(&mut conn)) => result??,
            _ = shutdown.changed() => {
                conn.close().await;
                return Ok(SessionEnd::Stopped);
            }
        };
        let (session, job) = protocol::parse_login(&result)?;

        self.policy.on_success();
        self.set_state(PoolState::Mining, Some(endpoint.url().to_string()));
        log::info!("[{}] logged in as {}", label, endpoint.config.user);
        self.apply_job(job, endpoint)?;

        let keepalive_every = self.settings.keepalive_interval;
        let mut keepalive = time::interval_at(Instant::now() + keepalive_every, keepalive_every);
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        conn.close().await;
                        return Ok(SessionEnd::Stopped);
                    }
                }
                text = conn.next_text() => {
                    let text = text?.ok_or_else(|| MinerError::ConnectionError("connection closed by pool".into()))?;
                    last_seen = Instant::now();
                    self.handle_message(&text, endpoint);
                }
                Some(solution) = self.solutions.recv() => {
                    self.submit(&mut conn, &session, solution).await?;
                }
                _ = keepalive.tick(), if endpoint.config.keepalive => {
                    let id = self.take_id();
                    conn.send_text(protocol::keepalive_request(id, &session).to_string()).await?;
                }
                _ = time::sleep_until(last_seen + self.settings.response_timeout) => {
                    return Err(MinerError::Timeout(format!(
                        "no data from pool for {}s",
                        self.settings.response_timeout.as_secs()
                    )));
                }
            }
        }
    }

    fn handle_message(&mut self, text: &str, endpoint: &PoolEndpoint) {
        let label = endpoint.label();
        let message = match protocol::parse_message(text) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("[{}] unreadable message: {}", label, e);
                return;
            }
        };

        match message {
            PoolMessage::Job(params) => {
                if let Err(e) = self.apply_job(params, endpoint) {
                    log::error!("[{}] invalid job: {}", label, e);
                }
            }
            PoolMessage::Response { id, result } => {
                // Replies to keepalives are not tracked.
                let Some((diff, sent)) = self.pending.remove(&id) else {
                    return;
                };
                let ms = sent.elapsed().as_millis();
                match result {
                    Ok(_) => {
                        self.accepted += 1;
                        log::info!(
                            "[{}] accepted ({}/{}) diff {} ({} ms)",
                            label,
                            self.accepted,
                            self.rejected,
                            diff,
                            ms
                        );
                        let _ = self.shares.send(ShareResult::Accepted);
                    }
                    Err(e) => {
                        self.rejected += 1;
                        log::warn!(
                            "[{}] rejected ({}/{}) diff {} {} ({} ms)",
                            label,
                            self.accepted,
                            self.rejected,
                            diff,
                            e,
                            ms
                        );
                        let _ = self.shares.send(ShareResult::Rejected);
                    }
                }
            }
            PoolMessage::Unknown(what) => log::debug!("[{}] ignoring {}", label, what),
        }
    }

    /// Versions a job and makes it the active one
    fn apply_job(&mut self, params: JobParams, endpoint: &PoolEndpoint) -> Result<(), MinerError> {
        let version = self.version + 1;
        let job = params.into_job(self.settings.algorithm, endpoint.ordinal, self.epoch, version)?;
        self.version = version;

        if job.algorithm != self.settings.algorithm {
            log::warn!(
                "[{}] pool asks for {}, engine computes {}",
                endpoint.label(),
                job.algorithm,
                self.settings.algorithm
            );
        }
        log::info!("[{}] new {}", endpoint.label(), job);

        let difficulty = job.target.difficulty();
        if self.workers.publish(job) {
            self.current = Some((version, difficulty));
        }
        Ok(())
    }

    async fn submit(
        &mut self,
        conn: &mut Connection,
        session: &str,
        solution: Solution,
    ) -> Result<(), MinerError> {
        let Some((version, diff)) = self.current else {
            log::debug!("dropping solution for job {}: no active job", solution.job_id);
            return Ok(());
        };
        if solution.job_version != version {
            log::debug!(
                "dropping stale solution for job {} v{} (active v{})",
                solution.job_id,
                solution.job_version,
                version
            );
            return Ok(());
        }

        let id = self.take_id();
        self.pending.insert(id, (diff, Instant::now()));
        conn.send_text(protocol::submit_request(id, session, &solution).to_string())
            .await
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Forgets everything tied to the connection that just ended
    fn drop_connection_state(&mut self) {
        self.workers.clear_job();
        self.current = None;
        self.pending.clear();
        self.set_state(PoolState::Disconnected, None);
    }

    fn set_state(&self, state: PoolState, pool: Option<String>) {
        *self.status.state.lock() = state;
        *self.status.pool.lock() = pool;
    }
}

/// Waits for the reply to the login request
async fn wait_for_login(conn: &mut Connection) -> Result<serde_json::Value, MinerError> {
    loop {
        let text = conn
            .next_text()
            .await?
            .ok_or_else(|| MinerError::ConnectionError("connection closed during login".into()))?;
        match protocol::parse_message(&text)? {
            PoolMessage::Response { id: LOGIN_ID, result } => {
                return result.map_err(|e| MinerError::ProtocolError(format!("login failed: {}", e)));
            }
            other => log::debug!("ignoring {:?} before login reply", other),
        }
    }
}

/// Observes and stops a running [`PoolClient`]
pub struct PoolHandle {
    stop: watch::Sender<bool>,
    status: Arc<PoolStatus>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PoolHandle {
    /// Tears down the connection and suppresses further attempts
    ///
    /// Safe to call any number of times.
    pub fn stop(&self) {
        if !self.stop.send_replace(true) {
            log::debug!("pool client stop requested");
        }
        let idle = self.task.lock().is_none();
        if idle {
            *self.status.state.lock() = PoolState::Stopped;
        }
    }

    /// Waits for the client task to finish after [`PoolHandle::stop`]
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::error!("pool client task failed: {}", e);
            }
        }
    }

    /// Current connection state
    pub fn state(&self) -> PoolState {
        *self.status.state.lock()
    }

    /// URL of the pool being connected to or mined on
    pub fn current_pool(&self) -> Option<String> {
        self.status.pool.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::testing::NonceEngine;
    use crate::miner::job::MIN_BLOB_SIZE;
    use crate::miner::scheduler::UnitFault;
    use futures::{SinkExt, StreamExt};
    use serde_json::{Value, json};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::{self, UnboundedSender};
    use tungstenite::protocol::Message;

    fn settings() -> PoolSettings {
        PoolSettings {
            algorithm: AlgorithmType::RandomX,
            connect_timeout: Duration::from_secs(2),
            response_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(60),
            retry_pause: Duration::from_millis(20),
            max_retry_pause: Duration::from_millis(100),
        }
    }

    fn pool(url: String) -> PoolConfig {
        PoolConfig {
            url,
            user: "wallet".into(),
            pass: "x".into(),
            keepalive: false,
        }
    }

    fn job_json(id: &str) -> Value {
        json!({ "job_id": id, "blob": hex::encode(vec![0u8; MIN_BLOB_SIZE]), "target": "ffffffff" })
    }

    struct Harness {
        workers: Arc<WorkerPool>,
        solutions: UnboundedSender<Solution>,
        shares: crossbeam_channel::Receiver<ShareResult>,
        _faults: mpsc::UnboundedReceiver<UnitFault>,
        handle: PoolHandle,
    }

    fn spawn_client(pools: Vec<PoolConfig>) -> Harness {
        spawn_client_with(pools, settings())
    }

    fn spawn_client_with(pools: Vec<PoolConfig>, settings: PoolSettings) -> Harness {
        let (unused_tx, _) = mpsc::unbounded_channel();
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        let workers = Arc::new(WorkerPool::new(Arc::new(NonceEngine), unused_tx, fault_tx));
        let (sol_tx, sol_rx) = mpsc::unbounded_channel();
        let (share_tx, share_rx) = crossbeam_channel::unbounded();

        let client = PoolClient::new(&pools, settings, Arc::clone(&workers), sol_rx, share_tx);
        Harness {
            workers,
            solutions: sol_tx,
            shares: share_rx,
            _faults: fault_rx,
            handle: client.connect(),
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..300 {
            if cond() {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    /// Accepts one WebSocket client, answers login with `job`, then replies
    /// OK to one submit and echoes its params back through `seen`.
    async fn ws_pool(listener: TcpListener, job: Value, seen: mpsc::UnboundedSender<Value>) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let login: Value = serde_json::from_str(ws.next().await.unwrap().unwrap().to_text().unwrap()).unwrap();
        assert_eq!(login["method"], "login");
        let reply = json!({"id": login["id"], "error": null, "result": {"id": "sess", "job": job, "status": "OK"}});
        ws.send(Message::Text(reply.to_string().into())).await.unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            let Ok(text) = msg.to_text() else { continue };
            let Ok(req) = serde_json::from_str::<Value>(text) else { continue };
            if req["method"] == "submit" {
                let reply = json!({"id": req["id"], "error": null, "result": {"status": "OK"}});
                ws.send(Message::Text(reply.to_string().into())).await.unwrap();
                let _ = seen.send(req["params"].clone());
            }
        }
    }

    #[tokio::test]
    async fn login_job_reaches_workers_and_share_is_accepted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://127.0.0.1:{}", listener.local_addr().unwrap().port());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(ws_pool(listener, job_json("j1"), seen_tx));

        let h = spawn_client(vec![pool(url.clone())]);
        wait_until(|| h.workers.active_job().is_some()).await;
        assert_eq!(h.handle.state(), PoolState::Mining);
        assert_eq!(h.handle.current_pool().as_deref(), Some(url.as_str()));

        let job = h.workers.active_job().unwrap();
        assert_eq!(job.id, "j1");
        assert_eq!(job.epoch, 1);

        h.solutions
            .send(Solution { job_id: "j1".into(), job_version: job.version, nonce: 7, digest: [0; 32] })
            .unwrap();
        let params = time::timeout(Duration::from_secs(3), seen_rx.recv()).await.unwrap().unwrap();
        assert_eq!(params["id"], "sess");
        assert_eq!(params["nonce"], "07000000");

        let shares = h.shares.clone();
        wait_until(|| !shares.is_empty()).await;
        assert_eq!(h.shares.try_recv().unwrap(), ShareResult::Accepted);

        h.handle.stop();
        h.handle.stop();
        time::timeout(Duration::from_secs(3), h.handle.join()).await.unwrap();
        assert_eq!(h.handle.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn stale_solutions_are_not_submitted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://127.0.0.1:{}", listener.local_addr().unwrap().port());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(ws_pool(listener, job_json("j1"), seen_tx));

        let h = spawn_client(vec![pool(url)]);
        wait_until(|| h.workers.active_job().is_some()).await;
        let version = h.workers.active_version();

        h.solutions
            .send(Solution { job_id: "old".into(), job_version: version - 1, nonce: 1, digest: [0; 32] })
            .unwrap();
        h.solutions
            .send(Solution { job_id: "j1".into(), job_version: version, nonce: 2, digest: [0; 32] })
            .unwrap();

        let params = time::timeout(Duration::from_secs(3), seen_rx.recv()).await.unwrap().unwrap();
        assert_eq!(params["job_id"], "j1");
        assert!(seen_rx.try_recv().is_err());
        h.handle.stop();
    }

    #[tokio::test]
    async fn fails_over_to_next_pool_over_tcp() {
        // Dead endpoint: bind then drop so the port refuses connections.
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_url = format!("stratum+tcp://127.0.0.1:{}", dead.local_addr().unwrap().port());
        drop(dead);

        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_url = format!("stratum+tcp://127.0.0.1:{}", live.local_addr().unwrap().port());
        tokio::spawn(async move {
            let (stream, _) = live.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let login: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            let reply = json!({"id": login["id"], "result": {"id": "s", "job": job_json("tcp"), "status": "OK"}});
            write_half.write_all(format!("{}\n", reply).as_bytes()).await.unwrap();
            while let Ok(Some(_)) = lines.next_line().await {}
        });

        let h = spawn_client(vec![pool(dead_url), pool(live_url.clone())]);
        wait_until(|| h.workers.active_job().is_some()).await;

        let job = h.workers.active_job().unwrap();
        assert_eq!(job.id, "tcp");
        assert_eq!(job.pool, 1);
        assert_eq!(job.epoch, 2);
        assert_eq!(h.handle.current_pool().as_deref(), Some(live_url.as_str()));
        h.handle.stop();
    }

    #[tokio::test]
    async fn disconnect_clears_active_job() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("stratum+tcp://127.0.0.1:{}", listener.local_addr().unwrap().port());
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let login: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            let reply = json!({"id": login["id"], "result": {"id": "s", "job": job_json("gone"), "status": "OK"}});
            write_half.write_all(format!("{}\n", reply).as_bytes()).await.unwrap();
            time::sleep(Duration::from_millis(100)).await;
            // Listener and stream drop here; reconnects are refused.
        });

        let h = spawn_client(vec![pool(url)]);
        wait_until(|| h.workers.active_job().is_some()).await;
        wait_until(|| h.workers.active_job().is_none()).await;
        assert_ne!(h.handle.state(), PoolState::Mining);
        h.handle.stop();
        time::timeout(Duration::from_secs(3), h.handle.join()).await.unwrap();
        assert_eq!(h.handle.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn later_jobs_get_higher_versions() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("stratum+tcp://127.0.0.1:{}", listener.local_addr().unwrap().port());
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let login: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            let reply = json!({"id": login["id"], "result": {"id": "s", "job": job_json("a"), "status": "OK"}});
            write_half.write_all(format!("{}\n", reply).as_bytes()).await.unwrap();
            let notify = json!({"jsonrpc": "2.0", "method": "job", "params": job_json("b")});
            write_half.write_all(format!("{}\n", notify).as_bytes()).await.unwrap();
            while let Ok(Some(_)) = lines.next_line().await {}
        });

        let h = spawn_client(vec![pool(url)]);
        wait_until(|| h.workers.active_job().is_some_and(|j| j.id == "b")).await;
        assert_eq!(h.workers.active_version(), 2);
        h.handle.stop();
    }

    #[tokio::test]
    async fn rejected_share_is_counted_without_failover() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("stratum+tcp://127.0.0.1:{}", listener.local_addr().unwrap().port());
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let req: Value = serde_json::from_str(&line).unwrap();
                let reply = match req["method"].as_str() {
                    Some("login") => json!({"id": req["id"], "result": {"id": "s", "job": job_json("low"), "status": "OK"}}),
                    Some("submit") => json!({
                        "id": req["id"],
                        "result": null,
                        "error": {"code": -1, "message": "Low difficulty share"}
                    }),
                    _ => continue,
                };
                write_half.write_all(format!("{}\n", reply).as_bytes()).await.unwrap();
            }
        });

        let h = spawn_client(vec![pool(url)]);
        wait_until(|| h.workers.active_job().is_some()).await;
        let job = h.workers.active_job().unwrap();

        h.solutions
            .send(Solution { job_id: "low".into(), job_version: job.version, nonce: 3, digest: [0; 32] })
            .unwrap();
        let shares = h.shares.clone();
        wait_until(|| !shares.is_empty()).await;
        assert_eq!(h.shares.try_recv().unwrap(), ShareResult::Rejected);

        // A reject is not a connection failure.
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.handle.state(), PoolState::Mining);
        let still = h.workers.active_job().unwrap();
        assert_eq!(still.epoch, 1);
        assert_eq!(still.version, job.version);
        h.handle.stop();
    }

    #[tokio::test]
    async fn silent_pool_times_out_and_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("stratum+tcp://127.0.0.1:{}", listener.local_addr().unwrap().port());
        tokio::spawn(async move {
            // First session goes quiet right after login.
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut quiet = BufReader::new(read_half).lines();
            let login: Value = serde_json::from_str(&quiet.next_line().await.unwrap().unwrap()).unwrap();
            let reply = json!({"id": login["id"], "result": {"id": "s1", "job": job_json("quiet"), "status": "OK"}});
            write_half.write_all(format!("{}\n", reply).as_bytes()).await.unwrap();
            let _held = (quiet, write_half);

            // Second session answers late, then keeps talking.
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let login: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            time::sleep(Duration::from_millis(100)).await;
            let reply = json!({"id": login["id"], "result": {"id": "s2", "job": job_json("chatty"), "status": "OK"}});
            write_half.write_all(format!("{}\n", reply).as_bytes()).await.unwrap();
            let chatter = json!({"jsonrpc": "2.0", "method": "status"});
            loop {
                time::sleep(Duration::from_millis(50)).await;
                if write_half.write_all(format!("{}\n", chatter).as_bytes()).await.is_err() {
                    return;
                }
            }
        });

        let mut settings = settings();
        settings.response_timeout = Duration::from_millis(200);
        let h = spawn_client_with(vec![pool(url)], settings);

        wait_until(|| h.workers.active_job().is_some_and(|j| j.epoch == 1)).await;
        wait_until(|| h.workers.active_job().is_none()).await;
        wait_until(|| h.workers.active_job().is_some_and(|j| j.epoch == 2)).await;

        let job = h.workers.active_job().unwrap();
        assert_eq!(job.id, "chatty");
        assert_eq!(job.pool, 0);
        assert_eq!(h.handle.state(), PoolState::Mining);
        h.handle.stop();
    }

    #[tokio::test]
    async fn keepalive_pings_carry_the_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("stratum+tcp://127.0.0.1:{}", listener.local_addr().unwrap().port());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let login: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            let reply = json!({"id": login["id"], "result": {"id": "sess-k", "job": job_json("k"), "status": "OK"}});
            write_half.write_all(format!("{}\n", reply).as_bytes()).await.unwrap();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = seen_tx.send(serde_json::from_str::<Value>(&line).unwrap());
            }
        });

        let mut settings = settings();
        settings.keepalive_interval = Duration::from_millis(50);
        let mut config = pool(url);
        config.keepalive = true;
        let h = spawn_client_with(vec![config], settings);

        let ping = time::timeout(Duration::from_secs(3), seen_rx.recv()).await.unwrap().unwrap();
        assert_eq!(ping["method"], "keepalived");
        assert_eq!(ping["params"]["id"], "sess-k");
        assert_eq!(h.handle.state(), PoolState::Mining);
        h.handle.stop();
    }

    #[tokio::test]
    async fn no_valid_pool_is_a_noop() {
        let h = spawn_client(vec![pool("http://nope:1".into())]);
        assert_eq!(h.handle.state(), PoolState::Disconnected);
        h.handle.stop();
        h.handle.join().await;
        assert_eq!(h.handle.state(), PoolState::Stopped);
        assert!(h.workers.active_job().is_none());
    }

    #[test]
    fn pool_config_defaults() {
        let config: PoolConfig = toml::from_str("url = \"ws://a:1\"\nuser = \"u\"").unwrap();
        assert_eq!(config.pass, "x");
        assert!(config.keepalive);
    }
}
