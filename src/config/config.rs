// src/config/config.rs
use crate::{control::ControlConfig, network::pool::PoolConfig, types::AlgorithmType, utils::error::MinerError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
///
/// Read once at startup; nothing in the engine writes it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Mining algorithm to use (e.g., "randomx", "cryptonight-v7")
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Number of worker threads (0 = number of CPU cores)
    #[serde(default)]
    pub threads: usize,

    /// CPU affinity bit mask; unit `i` is pinned to the `i`-th set bit
    #[serde(default)]
    pub cpu_affinity: Option<u64>,

    /// Worker scheduling priority, 0 (idle) to 5 (highest)
    #[serde(default)]
    pub cpu_priority: Option<u8>,

    /// Hardware acceleration flag handed to the hash engine
    #[serde(default = "default_true")]
    pub hw_accel: bool,

    /// Skip the hash self-test (logged at startup)
    #[serde(default)]
    pub skip_self_check: bool,

    /// Seconds between hashrate reports (0 disables them)
    #[serde(default = "default_print_time")]
    pub print_time: u64,

    /// Default log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Base failover backoff in seconds
    #[serde(default = "default_retry_pause")]
    pub retry_pause: u64,

    /// Failover backoff cap in seconds
    #[serde(default = "default_max_retry_pause")]
    pub max_retry_pause: u64,

    /// Pool connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Seconds without any pool message before the connection is dropped
    #[serde(default = "default_response_timeout")]
    pub response_timeout: u64,

    /// Ordered pool failover list
    #[serde(default)]
    pub pools: Vec<PoolConfig>,

    /// Fleet-management endpoint; control channel is off when absent
    #[serde(default)]
    pub control: Option<ControlConfig>,
}

fn default_algorithm() -> String {
    "randomx".into()
}

fn default_true() -> bool {
    true
}

fn default_print_time() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".into()
}

fn default_retry_pause() -> u64 {
    5
}

fn default_max_retry_pause() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_response_timeout() -> u64 {
    150
}

impl Config {
    /// Loads and validates configuration from a TOML file
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded configuration
    /// * `Err(MinerError)` - If the file couldn't be read, parsed or validated
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::from_toml(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration without validating it
    pub fn from_toml(text: &str) -> Result<Self, MinerError> {
        toml::from_str(text).map_err(|e| MinerError::ConfigError(format!("Invalid config format: {}", e)))
    }

    /// Rejects configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), MinerError> {
        self.algorithm_type()?;

        if let Some(priority) = self.cpu_priority {
            if priority > 5 {
                return Err(MinerError::ConfigError(format!(
                    "cpu_priority must be 0..=5, got {}",
                    priority
                )));
            }
        }
        if self.pools.is_empty() && self.control.is_none() {
            return Err(MinerError::ConfigError(
                "no pools and no control endpoint configured".into(),
            ));
        }
        if let Some(control) = &self.control {
            control.validate()?;
        }
        for (name, value) in [
            ("retry_pause", self.retry_pause),
            ("connect_timeout", self.connect_timeout),
            ("response_timeout", self.response_timeout),
        ] {
            if value == 0 {
                return Err(MinerError::ConfigError(format!("{} must be at least 1 second", name)));
            }
        }
        if self.max_retry_pause < self.retry_pause {
            return Err(MinerError::ConfigError(
                "max_retry_pause must not be below retry_pause".into(),
            ));
        }
        Ok(())
    }

    /// Parsed algorithm selector
    pub fn algorithm_type(&self) -> Result<AlgorithmType, MinerError> {
        self.algorithm
            .parse()
            .map_err(|_| MinerError::ConfigError(format!("Invalid algorithm: {}", self.algorithm)))
    }

    /// Thread count with `0` resolved to the number of CPUs
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    /// Base failover backoff
    pub fn retry_pause(&self) -> Duration {
        Duration::from_secs(self.retry_pause)
    }

    /// Failover backoff cap
    pub fn max_retry_pause(&self) -> Duration {
        Duration::from_secs(self.max_retry_pause)
    }

    /// Generates a configuration template string
    ///
    /// # Arguments
    /// * `control` - Include the control channel section
    pub fn generate_template(control: bool) -> String {
        let mut template = String::new();
        template.push_str("# Miner configuration\n\n");
        template.push_str("# Supported algorithms: randomx, cryptonight-v7, cryptonight-r\n");
        template.push_str("# randomx hashes with a fixed dataset key, so pools that send a\n");
        template.push_str("# different seed_hash reject its shares\n");
        template.push_str("algorithm = \"cryptonight-r\"\n");
        template.push_str("# Number of worker threads (0 = auto-detect)\n");
        template.push_str("threads = 0\n");
        template.push_str("# CPU affinity bit mask (unset = no pinning)\n");
        template.push_str("# cpu_affinity = 0xF\n");
        template.push_str("# Thread priority 0 (idle) .. 5 (highest)\n");
        template.push_str("# cpu_priority = 2\n");
        template.push_str("hw_accel = true\n");
        template.push_str("skip_self_check = false\n");
        template.push_str("print_time = 60\n");
        template.push_str("retry_pause = 5\n");
        template.push_str("max_retry_pause = 60\n\n");

        template.push_str("# Pools are tried in order, wrapping around on failure\n");
        template.push_str("[[pools]]\n");
        template.push_str("url = \"stratum+tcp://pool.example.com:3333\"\n");
        template.push_str("user = \"your_wallet_address\"\n");
        template.push_str("pass = \"x\"\n");
        template.push_str("keepalive = true\n");

        if control {
            template.push_str("\n# Fleet-management control channel\n");
            template.push_str("[control]\n");
            template.push_str("url = \"http://cc.example.com:3344\"\n");
            template.push_str("access_token = \"change-me\"\n");
            template.push_str("worker_id = \"worker01\"\n");
            template.push_str("update_interval = 10\n");
            template.push_str("# reboot_cmd = \"sudo reboot\"\n");
        }

        template
    }
}
