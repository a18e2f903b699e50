// src/miner/algorithm/mod.rs
//! Hash engines
//!
//! The engine is an opaque oracle to the rest of the miner: give it a blob
//! with the nonce already in place, get a 32-byte digest back. This module
//! also owns the pre-flight self-test that gates [`WorkerPool::start`].
//!
//! [`WorkerPool::start`]: crate::miner::WorkerPool::start

/// RandomX engine
pub mod randomx;

/// CryptoNight engines (variant 1 and R)
pub mod cryptonight;

use crate::miner::job::{MIN_BLOB_SIZE, write_nonce};
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use std::sync::Arc;

/// Common interface for all hash engines
///
/// Implementations must be safe to call concurrently from every worker
/// unit with independent inputs.
pub trait HashEngine: Send + Sync {
    /// Hashes a blob whose nonce bytes are already filled in
    fn hash(&self, blob: &[u8]) -> Result<[u8; 32], MinerError>;

    /// The algorithm this engine computes
    fn algorithm_type(&self) -> AlgorithmType;

    /// Hashes `blob` with `nonce` written into its nonce slot
    ///
    /// Copies the blob; the worker hot loop keeps its own buffer and calls
    /// [`HashEngine::hash`] directly instead.
    fn hash_nonce(&self, blob: &[u8], nonce: u32) -> Result<[u8; 32], MinerError> {
        let mut buf = blob.to_vec();
        write_nonce(&mut buf, nonce);
        self.hash(&buf)
    }
}

/// Builds the engine for `algorithm`
///
/// `hw_accel` selects RandomX's full-dataset mode; CryptoNight ignores it.
pub fn create(algorithm: AlgorithmType, hw_accel: bool) -> Result<Arc<dyn HashEngine>, MinerError> {
    match algorithm {
        AlgorithmType::RandomX => {
            log::warn!(
                "RandomX is keyed with a fixed seed; a pool whose seed_hash differs will reject every share"
            );
            Ok(Arc::new(randomx::RandomX::new(hw_accel, &randomx::FIXED_KEY)))
        }
        AlgorithmType::CryptoNightV7 => Ok(Arc::new(cryptonight::CryptoNightAlgo::new(1)?)),
        AlgorithmType::CryptoNightR => Ok(Arc::new(cryptonight::CryptoNightAlgo::new(4)?)),
    }
}

/// Checks an engine is deterministic and nonce-sensitive
///
/// Hashes a fixed reference blob twice with the same nonce and once with a
/// different one. Equal inputs must agree, different nonces must not, and
/// no digest may be all zeroes.
pub fn self_test(engine: &dyn HashEngine) -> Result<(), MinerError> {
    let name = engine.algorithm_type().to_string();
    let blob: Vec<u8> = (0..MIN_BLOB_SIZE as u8).map(|b| b.wrapping_mul(7)).collect();

    let first = engine.hash_nonce(&blob, 0)?;
    let again = engine.hash_nonce(&blob, 0)?;
    let other = engine.hash_nonce(&blob, 1)?;

    if first != again {
        return Err(MinerError::SelfTestFailed(name, "digest is not deterministic".into()));
    }
    if first == other {
        return Err(MinerError::SelfTestFailed(name, "digest ignores the nonce".into()));
    }
    if first == [0u8; 32] || other == [0u8; 32] {
        return Err(MinerError::SelfTestFailed(name, "digest is all zeroes".into()));
    }
    Ok(())
}

/// Runs the self-test unless explicitly skipped
///
/// This is the gate the supervisor consults before any worker starts; the
/// skip is always logged.
pub fn preflight(engine: &dyn HashEngine, skip_self_check: bool) -> Result<(), MinerError> {
    let name = engine.algorithm_type();
    log::info!("{} hash self-test", name);

    if skip_self_check {
        log::warn!("{} hash self-test... skipped (skip_self_check = true)", name);
        return Ok(());
    }

    match self_test(engine) {
        Ok(()) => {
            log::info!("{} hash self-test... successful.", name);
            Ok(())
        }
        Err(e) => {
            log::error!("{} hash self-test... failed.", name);
            Err(e)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic engines for worker and supervisor tests

    use super::*;
    use crate::miner::job::read_nonce;

    /// Digest whose target-compared tail is the nonce itself
    ///
    /// With `Target::from_u64(n)` exactly the nonces `0..n` are solutions.
    pub struct NonceEngine;

    impl HashEngine for NonceEngine {
        fn hash(&self, blob: &[u8]) -> Result<[u8; 32], MinerError> {
            let nonce = read_nonce(blob) as u64;
            let mut digest = [0xAAu8; 32];
            digest[24..32].copy_from_slice(&nonce.to_le_bytes());
            Ok(digest)
        }

        fn algorithm_type(&self) -> AlgorithmType {
            AlgorithmType::RandomX
        }
    }

    /// Returns a constant digest regardless of input
    pub struct ConstantEngine;

    impl HashEngine for ConstantEngine {
        fn hash(&self, _blob: &[u8]) -> Result<[u8; 32], MinerError> {
            Ok([1u8; 32])
        }

        fn algorithm_type(&self) -> AlgorithmType {
            AlgorithmType::CryptoNightR
        }
    }

    /// Fails every hash once `fail_at` nonce is reached
    pub struct FaultyEngine {
        pub fail_at: u32,
    }

    impl HashEngine for FaultyEngine {
        fn hash(&self, blob: &[u8]) -> Result<[u8; 32], MinerError> {
            let nonce = read_nonce(blob);
            if nonce >= self.fail_at {
                return Err(MinerError::AlgorithmError(format!("bad nonce {}", nonce)));
            }
            NonceEngine.hash(blob)
        }

        fn algorithm_type(&self) -> AlgorithmType {
            AlgorithmType::RandomX
        }
    }
}
