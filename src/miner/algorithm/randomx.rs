// src/miner/algorithm/randomx.rs
//! RandomX engine
//!
//! Wraps `rust-randomx`. The dataset context is built once and shared by
//! every worker unit; each hash call gets its own lightweight hasher.

use crate::miner::algorithm::HashEngine;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use rust_randomx::{Context, Hasher};
use std::sync::Arc;

/// Dataset key used until jobs carry their seed hash
pub const FIXED_KEY: [u8; 32] = [0u8; 32];

/// RandomX engine sharing one dataset across threads
#[derive(Clone)]
pub struct RandomX {
    /// Shared context holding the (possibly 2 GiB) dataset
    context: Arc<Context>,
}

impl RandomX {
    /// Initializes the dataset for `key`
    ///
    /// `fast` builds the full dataset (~2080 MiB) instead of the light
    /// cache (~256 MiB). Initialization takes several seconds either way.
    pub fn new(fast: bool, key: &[u8]) -> Self {
        log::info!(
            "initializing RandomX {} mode",
            if fast { "fast (full dataset)" } else { "light" }
        );
        let context = Arc::new(Context::new(key, fast));
        Self { context }
    }
}

impl HashEngine for RandomX {
    fn hash(&self, blob: &[u8]) -> Result<[u8; 32], MinerError> {
        // TODO: keep one hasher per worker unit instead of one per call
        let hasher = Hasher::new(Arc::clone(&self.context));
        let output = hasher.hash(blob);

        output
            .as_ref()
            .try_into()
            .map_err(|_| MinerError::AlgorithmError("RandomX output is not 32 bytes".into()))
    }

    fn algorithm_type(&self) -> AlgorithmType {
        AlgorithmType::RandomX
    }
}
