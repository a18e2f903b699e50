// src/miner/algorithm/cryptonight.rs
//! CryptoNight engines backed by `cryptonight-rs`

use crate::miner::algorithm::HashEngine;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use cryptonight::cryptonight;

/// CryptoNight engine for a single variant
///
/// Only variants 1 (V7) and 4 (R) are accepted.
pub struct CryptoNightAlgo {
    variant: i32,
}

impl CryptoNightAlgo {
    /// Creates an engine for `variant`
    pub fn new(variant: i32) -> Result<Self, MinerError> {
        match variant {
            1 | 4 => Ok(Self { variant }),
            other => Err(MinerError::AlgorithmError(format!(
                "Unsupported CryptoNight variant: {}",
                other
            ))),
        }
    }
}

impl HashEngine for CryptoNightAlgo {
    fn hash(&self, blob: &[u8]) -> Result<[u8; 32], MinerError> {
        let digest = cryptonight(blob, blob.len(), self.variant);
        digest
            .as_slice()
            .try_into()
            .map_err(|_| MinerError::AlgorithmError("CryptoNight output is not 32 bytes".into()))
    }

    fn algorithm_type(&self) -> AlgorithmType {
        if self.variant == 1 {
            AlgorithmType::CryptoNightV7
        } else {
            AlgorithmType::CryptoNightR
        }
    }
}
