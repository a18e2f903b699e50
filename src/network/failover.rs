// src/network/failover.rs
//! Pool failover order and reconnect backoff

use crate::network::pool::PoolConfig;
use std::time::Duration;
use url::Url;

/// Schemes the pool client knows how to speak
pub const SUPPORTED_SCHEMES: [&str; 3] = ["stratum+tcp", "ws", "wss"];

/// A configured pool and its position in the failover list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEndpoint {
    /// Position in the configured list (0-based)
    pub ordinal: usize,
    /// Connection settings and credentials
    pub config: PoolConfig,
}

impl PoolEndpoint {
    /// Wraps a configured pool with its list position
    pub fn new(ordinal: usize, config: PoolConfig) -> Self {
        PoolEndpoint { ordinal, config }
    }

    /// Pool URL as configured
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// `host:port` used as a log prefix
    pub fn label(&self) -> String {
        match Url::parse(&self.config.url) {
            Ok(url) => format!(
                "{}:{}",
                url.host_str().unwrap_or("?"),
                url.port_or_known_default().unwrap_or(0)
            ),
            Err(_) => self.config.url.clone(),
        }
    }

    /// Syntactic check of URL and credentials; no network access
    pub fn validate(&self) -> Result<(), String> {
        let url = Url::parse(&self.config.url).map_err(|e| format!("invalid url: {}", e))?;
        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            return Err(format!("unsupported scheme '{}'", url.scheme()));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err("missing host".into());
        }
        if url.port_or_known_default().is_none() {
            return Err("missing port".into());
        }
        if self.config.user.trim().is_empty() {
            return Err("missing user".into());
        }
        Ok(())
    }

    /// Whether [`PoolEndpoint::validate`] passes
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Shortest delay between two connection attempts
pub const MIN_RETRY_PAUSE: Duration = Duration::from_millis(50);

/// Doubling backoff with a cap
///
/// The delay never decreases until [`Backoff::reset`] is called and never
/// drops below [`MIN_RETRY_PAUSE`].
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    /// Creates a backoff starting at `base` and capped at `max`
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(MIN_RETRY_PAUSE);
        Backoff {
            base,
            max: max.max(base),
            attempt: 0,
        }
    }

    /// Delay before the next attempt; advances the sequence
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt.min(16)).unwrap_or(u32::MAX);
        self.attempt = self.attempt.saturating_add(1);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Back to the base delay after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Ordered, wrapping failover across the valid configured pools
#[derive(Debug, Clone)]
pub struct FailoverPolicy {
    endpoints: Vec<PoolEndpoint>,
    current: usize,
    backoff: Backoff,
}

impl FailoverPolicy {
    /// Keeps the syntactically valid pools, in configured order
    ///
    /// Invalid entries are logged and skipped.
    pub fn new(pools: &[PoolConfig], backoff: Backoff) -> Self {
        let endpoints = pools
            .iter()
            .cloned()
            .enumerate()
            .map(|(ordinal, config)| PoolEndpoint::new(ordinal, config))
            .filter(|endpoint| match endpoint.validate() {
                Ok(()) => true,
                Err(reason) => {
                    log::warn!("skipping pool #{} {}: {}", endpoint.ordinal, endpoint.url(), reason);
                    false
                }
            })
            .collect();

        FailoverPolicy {
            endpoints,
            current: 0,
            backoff,
        }
    }

    /// No pool can be tried
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Number of pools in rotation
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Pool the next attempt targets
    pub fn current(&self) -> Option<&PoolEndpoint> {
        self.endpoints.get(self.current)
    }

    /// Index of [`FailoverPolicy::current`] within the rotation
    pub fn position(&self) -> usize {
        self.current
    }

    /// The current pool worked: stay on it and reset the backoff
    pub fn on_success(&mut self) {
        self.backoff.reset();
    }

    /// The current pool failed: move to the next one
    ///
    /// Returns how long to wait before trying it.
    pub fn on_failure(&mut self) -> Duration {
        if !self.endpoints.is_empty() {
            self.current = (self.current + 1) % self.endpoints.len();
        }
        self.backoff.next_delay()
    }
}
