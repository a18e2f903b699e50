// src/utils/error.rs
use crate::control::ControlCommand;
use serde_json;
use std::io;
use thiserror::Error;
use tokio_tungstenite::tungstenite;
use url;

/// Main error type for the miner
///
/// Only [`MinerError::SelfTestFailed`] and [`MinerError::ConfigError`] are
/// fatal; everything the network or a single worker unit produces is
/// absorbed where it happens and only ever logged.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Errors related to mining algorithms (e.g., unsupported algorithm)
    #[error("Algorithm error: {0}")]
    AlgorithmError(String),

    /// The hash engine's pre-flight check did not reproduce its own output
    #[error("{0} hash self-test failed: {1}")]
    SelfTestFailed(String, String),

    /// Errors related to network connectivity
    #[error("Network connection error: {0}")]
    ConnectionError(String),

    /// Errors in protocol handling or invalid protocol messages
    #[error("Protocol violation: {0}")]
    ProtocolError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    /// WebSocket communication errors
    #[error("WebSocket error: {0}")]
    WsError(#[from] tungstenite::Error),

    /// HTTP request/response errors
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Thread communication channel errors
    #[error("Thread communication error: {0}")]
    ChannelError(String),

    /// Invalid user input or parameter errors
    #[error("Invalid input: {0}")]
    InputError(String),

    /// Async task execution errors
    #[error("Task execution error: {0}")]
    TaskError(String),

    /// A network operation did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A worker unit could not be started or failed while hashing
    #[error("Worker error: {0}")]
    WorkerError(String),
}

impl From<tokio::sync::mpsc::error::SendError<ControlCommand>> for MinerError {
    fn from(e: tokio::sync::mpsc::error::SendError<ControlCommand>) -> Self {
        MinerError::ChannelError(format!("Command {} dropped: control context gone", e.0))
    }
}

/// Converts hex decoding errors into MinerError
///
/// Hit while decoding job blobs and targets received from a pool.
impl From<hex::FromHexError> for MinerError {
    fn from(e: hex::FromHexError) -> Self {
        MinerError::InputError(format!("Hex conversion failed: {}", e))
    }
}

/// Converts async task join errors into MinerError
impl From<tokio::task::JoinError> for MinerError {
    fn from(e: tokio::task::JoinError) -> Self {
        MinerError::TaskError(format!("Async task failed: {}", e))
    }
}

impl From<tokio::time::error::Elapsed> for MinerError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        MinerError::Timeout("operation deadline elapsed".into())
    }
}

impl MinerError {
    /// Whether this error belongs to the fatal startup class
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MinerError::SelfTestFailed(..) | MinerError::ConfigError(_)
        )
    }
}
