// src/miner/job.rs
//! Jobs, targets and solutions
//!
//! A [`Job`] is immutable once published: a new job from the pool is a new
//! value with a higher `version`, never an in-place update.

use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use std::fmt;

/// Byte offset of the 32-bit nonce inside a hashing blob
pub const NONCE_OFFSET: usize = 39;

/// Smallest blob a pool may send
pub const MIN_BLOB_SIZE: usize = 76;

/// Largest blob a pool may send
pub const MAX_BLOB_SIZE: usize = 128;

/// Difficulty threshold a digest has to beat
///
/// Stored as the expanded 64-bit form; the compact 4-byte form pools send
/// is expanded in [`Target::from_hex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target(u64);

impl Target {
    /// Wraps an already expanded 64-bit threshold
    pub fn from_u64(value: u64) -> Result<Self, MinerError> {
        if value == 0 {
            return Err(MinerError::ProtocolError("target must not be zero".into()));
        }
        Ok(Target(value))
    }

    /// Parses a pool target: 8 hex chars (compact) or 16 hex chars (full)
    pub fn from_hex(hex_target: &str) -> Result<Self, MinerError> {
        let raw = hex::decode(hex_target)?;
        match raw.len() {
            4 => {
                let compact = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as u64;
                if compact == 0 {
                    return Err(MinerError::ProtocolError("target must not be zero".into()));
                }
                Target::from_u64(u64::MAX / (u32::MAX as u64 / compact))
            }
            8 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&raw);
                Target::from_u64(u64::from_le_bytes(bytes))
            }
            n => Err(MinerError::ProtocolError(format!(
                "target must be 4 or 8 bytes, got {}",
                n
            ))),
        }
    }

    /// Expanded threshold value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Share difficulty this target corresponds to
    pub fn difficulty(&self) -> u64 {
        u64::MAX / self.0
    }

    /// Whether `digest` satisfies this target
    ///
    /// Compares the little-endian u64 in the last eight digest bytes.
    pub fn is_met_by(&self, digest: &[u8; 32]) -> bool {
        let mut tail = [0u8; 8];
        tail.copy_from_slice(&digest[24..32]);
        u64::from_le_bytes(tail) < self.0
    }
}

/// A unit of proof-of-work handed out by a pool
#[derive(Debug, Clone)]
pub struct Job {
    /// Pool-assigned job identifier
    pub id: String,
    /// Algorithm the pool expects for this job
    pub algorithm: AlgorithmType,
    /// Hashing blob; the nonce bytes are overwritten by workers
    pub blob: Vec<u8>,
    /// Difficulty threshold
    pub target: Target,
    /// Ordinal of the pool endpoint that issued the job
    pub pool: usize,
    /// Connection epoch the job was received in
    pub epoch: u64,
    /// Process-wide monotonically increasing version
    pub version: u64,
}

impl Job {
    /// Builds a job after checking the blob can hold a nonce
    pub fn new(
        id: impl Into<String>,
        algorithm: AlgorithmType,
        blob: Vec<u8>,
        target: Target,
        pool: usize,
        epoch: u64,
        version: u64,
    ) -> Result<Self, MinerError> {
        if blob.len() < MIN_BLOB_SIZE || blob.len() > MAX_BLOB_SIZE {
            return Err(MinerError::ProtocolError(format!(
                "blob size {} outside {}..={}",
                blob.len(),
                MIN_BLOB_SIZE,
                MAX_BLOB_SIZE
            )));
        }
        Ok(Job {
            id: id.into(),
            algorithm,
            blob,
            target,
            pool,
            epoch,
            version,
        })
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job {} v{} (diff {}, algo {})",
            self.id,
            self.version,
            self.target.difficulty(),
            self.algorithm
        )
    }
}

/// Writes `nonce` into its slot inside a hashing blob
pub fn write_nonce(blob: &mut [u8], nonce: u32) {
    blob[NONCE_OFFSET..NONCE_OFFSET + 4].copy_from_slice(&nonce.to_le_bytes());
}

/// Reads the nonce back out of a hashing blob
pub fn read_nonce(blob: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&blob[NONCE_OFFSET..NONCE_OFFSET + 4]);
    u32::from_le_bytes(bytes)
}

/// A nonce whose digest met the job target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    /// Job ID this solution belongs to
    pub job_id: String,
    /// Version of the job it was found against
    pub job_version: u64,
    /// Nonce that produced the digest
    pub nonce: u32,
    /// Digest that meets the target
    pub digest: [u8; 32],
}

impl Solution {
    /// Nonce encoded the way pools expect it (little-endian hex)
    pub fn nonce_hex(&self) -> String {
        hex::encode(self.nonce.to_le_bytes())
    }
}
