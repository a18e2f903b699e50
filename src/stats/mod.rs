//! Statistics collection and reporting module
//!
//! - Windowed per-thread hashrate ([`Hashrate`])
//! - Share acceptance/rejection tracking and hardware readings
//!   ([`StatsReporter`])

/// Windowed hashrate sampler
pub mod hashrate;

/// Share accounting and periodic summary
pub mod reporter;

// Re-export main components
pub use hashrate::{Hashrate, HashrateSnapshot};
pub use reporter::{HardwareStats, MiningStats, ShareCounters, ShareResult, StatsReporter};
