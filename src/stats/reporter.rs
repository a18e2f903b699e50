// src/stats/reporter.rs
use crate::stats::hashrate::{HashrateSnapshot, format_rate};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use sysinfo::{Components, System};

/// Share accounting snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MiningStats {
    /// Number of shares accepted by the pool
    pub shares_accepted: u64,
    /// Number of shares rejected by the pool
    pub shares_rejected: u64,
    /// Time since the reporter was created
    pub uptime: Duration,
}

impl MiningStats {
    /// Accepted plus rejected
    pub fn shares_total(&self) -> u64 {
        self.shares_accepted + self.shares_rejected
    }
}

/// Statistics related to hardware performance
#[derive(Debug, Clone)]
pub struct HardwareStats {
    /// Current CPU usage percentage (0-100)
    pub cpu_usage: f32,
    /// Memory currently used (in bytes)
    pub memory_used: u64,
    /// Current CPU temperature in Celsius
    pub temperature: f32,
}

/// Read-only view of the share counters
///
/// Cheap to clone and `Send + Sync`, unlike the reporter itself.
#[derive(Clone)]
pub struct ShareCounters {
    stats: Arc<MiningStatsAtomic>,
}

impl ShareCounters {
    /// Current share counters
    pub fn get(&self) -> MiningStats {
        MiningStats {
            shares_accepted: self.stats.accepted.load(Ordering::Relaxed),
            shares_rejected: self.stats.rejected.load(Ordering::Relaxed),
            uptime: self.stats.start_time.elapsed(),
        }
    }
}

/// Collects share results and reports them with hardware readings
pub struct StatsReporter {
    /// Atomic counters shared with the share listener thread
    stats: Arc<MiningStatsAtomic>,
    /// System information collector
    system: System,
    /// Hardware component information collector
    components: Components,
}

/// Atomic version of MiningStats for thread-safe operations
struct MiningStatsAtomic {
    accepted: AtomicU64,
    rejected: AtomicU64,
    start_time: Instant,
}

impl Clone for StatsReporter {
    fn clone(&self) -> Self {
        StatsReporter {
            stats: self.stats.clone(),
            system: System::new_all(),
            components: Components::new_with_refreshed_list(),
        }
    }
}

impl Default for StatsReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsReporter {
    /// Creates a reporter with zeroed counters
    pub fn new() -> Self {
        StatsReporter {
            stats: Arc::new(MiningStatsAtomic {
                accepted: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                start_time: Instant::now(),
            }),
            system: System::new_all(),
            components: Components::new_with_refreshed_list(),
        }
    }

    /// Creates a channel sender for share results
    ///
    /// A background thread drains the channel into the counters until
    /// every sender is dropped.
    pub fn share_sender(&self) -> Sender<ShareResult> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.start_share_listener(rx);
        tx
    }

    /// Gets the current share counters
    pub fn get_stats(&self) -> MiningStats {
        self.counters().get()
    }

    /// Shareable handle on the share counters
    pub fn counters(&self) -> ShareCounters {
        ShareCounters {
            stats: Arc::clone(&self.stats),
        }
    }

    /// Gets the current hardware statistics
    ///
    /// This refreshes system information before returning the stats.
    pub fn get_hardware_stats(&mut self) -> HardwareStats {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.components.refresh(true);

        let cpus = self.system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let temperature = self
            .components
            .iter()
            .find(|c| c.label().contains("CPU"))
            .and_then(|c| c.temperature())
            .unwrap_or(0.0);

        HardwareStats {
            cpu_usage,
            memory_used: self.system.used_memory(),
            temperature,
        }
    }

    /// Logs one summary line: hashrate, shares and hardware readings
    pub fn log_summary(&mut self, hashrate: HashrateSnapshot) {
        let mining_stats = self.get_stats();
        let hw_stats = self.get_hardware_stats();

        log::info!(
            "Hashrate: {} H/s | Accepted/Rejected: {}/{} | CPU: {:.1}% | Temp: {:.1}°C",
            format_rate(hashrate.short),
            mining_stats.shares_accepted,
            mining_stats.shares_rejected,
            hw_stats.cpu_usage,
            hw_stats.temperature
        );
    }

    /// Starts a listener for share results on a background thread
    fn start_share_listener(&self, receiver: Receiver<ShareResult>) {
        let stats = self.stats.clone();

        std::thread::spawn(move || {
            for result in receiver {
                match result {
                    ShareResult::Accepted => stats.accepted.fetch_add(1, Ordering::Relaxed),
                    ShareResult::Rejected => stats.rejected.fetch_add(1, Ordering::Relaxed),
                };
            }
        });
    }
}

/// Result of submitting a share to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareResult {
    /// The share was accepted as valid
    Accepted,
    /// The share was rejected (stale, duplicate, low difficulty)
    Rejected,
}
