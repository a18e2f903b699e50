// src/network/protocol.rs
//! Stratum JSON-RPC messages
//!
//! Builds the three requests the miner sends (`login`, `submit`,
//! `keepalived`) and classifies what the pool sends back.

use crate::miner::job::{Job, Solution, Target};
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;

/// Request id used for the login call
pub const LOGIN_ID: u64 = 1;

/// Agent string sent on login
pub fn user_agent() -> String {
    format!("xmr_cc_miner/{}", env!("CARGO_PKG_VERSION"))
}

/// Builds the login request
pub fn login_request(user: &str, pass: &str, algorithm: AlgorithmType) -> Value {
    json!({
        "id": LOGIN_ID,
        "jsonrpc": "2.0",
        "method": "login",
        "params": {
            "login": user,
            "pass": pass,
            "agent": user_agent(),
            "algo": [algorithm.wire_name()]
        }
    })
}

/// Builds a share submission
pub fn submit_request(id: u64, session: &str, solution: &Solution) -> Value {
    json!({
        "id": id,
        "jsonrpc": "2.0",
        "method": "submit",
        "params": {
            "id": session,
            "job_id": solution.job_id,
            "nonce": solution.nonce_hex(),
            "result": hex::encode(solution.digest)
        }
    })
}

/// Builds a keepalive ping
pub fn keepalive_request(id: u64, session: &str) -> Value {
    json!({
        "id": id,
        "jsonrpc": "2.0",
        "method": "keepalived",
        "params": { "id": session }
    })
}

/// Job fields as the pool sends them
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobParams {
    /// Pool-assigned job id
    pub job_id: String,
    /// Hex-encoded hashing blob
    pub blob: String,
    /// Hex-encoded compact or full target
    pub target: String,
    /// Optional algorithm override
    #[serde(default)]
    pub algo: Option<String>,
}

impl JobParams {
    /// Decodes the job into a versioned [`Job`]
    ///
    /// # Arguments
    /// * `fallback` - Algorithm to use when the pool does not name one
    /// * `pool` - Ordinal of the issuing pool
    /// * `epoch` - Connection epoch
    /// * `version` - Process-wide job version
    pub fn into_job(
        self,
        fallback: AlgorithmType,
        pool: usize,
        epoch: u64,
        version: u64,
    ) -> Result<Job, MinerError> {
        let algorithm = match self.algo.as_deref() {
            Some(name) => name.parse().map_err(MinerError::ProtocolError)?,
            None => fallback,
        };
        let blob = hex::decode(&self.blob)?;
        let target = Target::from_hex(&self.target)?;
        Job::new(self.job_id, algorithm, blob, target, pool, epoch, version)
    }
}

/// Error object of a failed call
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcError {
    /// Pool error code
    #[serde(default)]
    pub code: i64,
    /// Human-readable reason
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\", code: {}", self.message, self.code)
    }
}

/// A classified message from the pool
#[derive(Debug, Clone, PartialEq)]
pub enum PoolMessage {
    /// New job notification
    Job(JobParams),
    /// Reply to one of our requests
    Response {
        /// Id of the request being answered
        id: u64,
        /// Call result or the pool's error
        result: Result<Value, RpcError>,
    },
    /// Anything else (ignored by the client)
    Unknown(String),
}

/// Classifies one line/frame of pool output
pub fn parse_message(text: &str) -> Result<PoolMessage, MinerError> {
    let value: Value = serde_json::from_str(text)?;

    if let Some(method) = value.get("method").and_then(Value::as_str) {
        return match method {
            "job" => {
                let params = value
                    .get("params")
                    .cloned()
                    .ok_or_else(|| MinerError::ProtocolError("job without params".into()))?;
                Ok(PoolMessage::Job(serde_json::from_value(params)?))
            }
            other => Ok(PoolMessage::Unknown(other.to_string())),
        };
    }

    let Some(id) = value.get("id").and_then(Value::as_u64) else {
        return Ok(PoolMessage::Unknown(text.to_string()));
    };

    let result = match value.get("error") {
        Some(error) if !error.is_null() => Err(serde_json::from_value(error.clone())?),
        _ => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
    };
    Ok(PoolMessage::Response { id, result })
}

/// Session id and initial job from a successful login result
pub fn parse_login(result: &Value) -> Result<(String, JobParams), MinerError> {
    let session = result
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| MinerError::ProtocolError("login result without id".into()))?
        .to_string();
    let job = result
        .get("job")
        .cloned()
        .ok_or_else(|| MinerError::ProtocolError("login result without job".into()))?;
    Ok((session, serde_json::from_value(job)?))
}
