// src/control/client.rs
//! Fleet-management client
//!
//! Every `update_interval` seconds the client uploads a status document and
//! reads back at most one pending command, which it hands to the engine
//! through the command bridge. Endpoint trouble is logged and retried on the
//! next tick; it never reaches the miner.

use crate::control::bridge::CommandSender;
use crate::control::command::ControlCommand;
use crate::utils::error::MinerError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

/// Configuration for the control channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Base URL of the fleet-management server
    pub url: String,
    /// Bearer token; empty disables the header
    #[serde(default)]
    pub access_token: String,
    /// Identifies this miner to the server
    #[serde(default = "default_worker_id")]
    pub worker_id: String,
    /// Seconds between status uploads
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,
    /// Shell command run on `REBOOT`
    #[serde(default)]
    pub reboot_cmd: Option<String>,
}

fn default_worker_id() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "miner".into())
}

fn default_update_interval() -> u64 {
    10
}

impl ControlConfig {
    /// Rejects a control section the client could not use
    pub fn validate(&self) -> Result<(), MinerError> {
        let url = Url::parse(&self.url)
            .map_err(|e| MinerError::ConfigError(format!("Invalid control url '{}': {}", self.url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(MinerError::ConfigError(format!(
                "control url must be http(s), got '{}'",
                url.scheme()
            )));
        }
        if self.worker_id.trim().is_empty() {
            return Err(MinerError::ConfigError("control worker_id must not be empty".into()));
        }
        if self.update_interval == 0 {
            return Err(MinerError::ConfigError("control update_interval must be positive".into()));
        }
        Ok(())
    }

    /// Status endpoint for this worker
    pub fn status_url(&self) -> Result<Url, MinerError> {
        let mut url = Url::parse(&format!("{}/client/setClientStatus", self.url.trim_end_matches('/')))?;
        url.query_pairs_mut().append_pair("clientId", &self.worker_id);
        Ok(url)
    }
}

/// Status document uploaded on every tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientStatus {
    /// Worker id from the configuration
    pub client_id: String,
    /// `RUNNING` or `PAUSED`
    pub current_status: String,
    /// Pool being mined on, if connected
    pub current_pool: Option<String>,
    /// Algorithm the engine computes
    pub current_algo_name: String,
    /// 10 s hashrate
    pub hashrate_short: Option<f64>,
    /// 60 s hashrate
    pub hashrate_medium: Option<f64>,
    /// 15 min hashrate
    pub hashrate_long: Option<f64>,
    /// Highest 10 s total seen
    pub hashrate_highest: f64,
    /// Accepted shares
    pub shares_good: u64,
    /// Accepted plus rejected shares
    pub shares_total: u64,
    /// Hashes computed since start
    pub hashes_total: u64,
    /// Units still alive
    pub current_threads: usize,
    /// Seconds since start
    pub uptime: u64,
    /// Miner version
    pub version: String,
}

/// Source of the status document
///
/// Implemented by the engine; called from the control task.
pub trait StatusProvider: Send + Sync {
    /// Current status snapshot
    fn status(&self) -> ClientStatus;
}

/// Reads the command tag out of a status response
///
/// `None` when the server has nothing queued.
pub fn parse_command(response: &Value) -> Option<Result<ControlCommand, String>> {
    let tag = response.get("control_command")?.get("command")?.as_str()?;
    Some(tag.parse())
}

/// HTTP client for the fleet-management endpoint
pub struct ControlClient {
    config: ControlConfig,
    client: Client,
    status: Arc<dyn StatusProvider>,
    commands: CommandSender,
}

impl ControlClient {
    /// Creates a new ControlClient
    ///
    /// # Arguments
    /// * `config` - Validated control section
    /// * `status` - Where status snapshots come from
    /// * `commands` - Producer side of the command bridge
    pub fn new(
        config: ControlConfig,
        status: Arc<dyn StatusProvider>,
        commands: CommandSender,
    ) -> Result<Self, MinerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.update_interval.clamp(5, 30)))
            .build()?;
        Ok(ControlClient {
            config,
            client,
            status,
            commands,
        })
    }

    /// Uploads one status document
    ///
    /// # Returns
    /// * `Ok(Some(command))` - The server queued a known command
    /// * `Ok(None)` - Nothing queued, or an unknown tag (logged)
    /// * `Err(MinerError)` - Transport or HTTP status failure
    pub async fn poll_once(&self) -> Result<Option<ControlCommand>, MinerError> {
        let mut request = self
            .client
            .post(self.config.status_url()?)
            .json(&self.status.status());
        if !self.config.access_token.is_empty() {
            request = request.bearer_auth(&self.config.access_token);
        }

        let response = request.send().await?.error_for_status()?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(&body)?;
        match parse_command(&value) {
            Some(Ok(command)) => Ok(Some(command)),
            Some(Err(e)) => {
                log::warn!("[control] ignoring: {}", e);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Polls until `shutdown` flips or the engine stops listening
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let every = Duration::from_secs(self.config.update_interval);
        let mut ticker = tokio::time::interval(every);
        log::info!(
            "[control] reporting to {} as {} every {}s",
            self.config.url,
            self.config.worker_id,
            every.as_secs()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            match self.poll_once().await {
                Ok(Some(command)) => {
                    log::info!("[control] received command {}", command);
                    if let Err(e) = self.commands.send(command).await {
                        log::debug!("[control] {}", e);
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("[control] {}: {}", self.config.url, e),
            }
        }
        log::debug!("[control] client stopped");
    }
}
