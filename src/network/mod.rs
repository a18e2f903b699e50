// src/network/mod.rs
//! Network communication components
//!
//! Everything between the worker pool and a remote mining pool:
//! - `protocol`: stratum JSON-RPC requests and message classification
//! - `transport`: WebSocket and line-oriented TCP connections
//! - `failover`: pool ordering and reconnect backoff
//! - `pool`: the `PoolClient` state machine and its `PoolHandle`

/// Stratum JSON-RPC messages
pub mod protocol;

/// WebSocket and TCP transports
pub mod transport;

/// Failover order and backoff
pub mod failover;

/// Mining pool client implementation
///
/// Connects to the configured pools in order, publishes jobs to the worker
/// pool and submits solutions back.
pub mod pool;

// Re-export main components for cleaner imports
pub use failover::{Backoff, FailoverPolicy, PoolEndpoint};
pub use pool::{PoolClient, PoolConfig, PoolHandle, PoolSettings, PoolState};
