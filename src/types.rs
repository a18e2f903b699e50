// src/types.rs
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Proof-of-work algorithm selector
///
/// Picks which [`HashEngine`](crate::miner::HashEngine) is built at startup and
/// is matched against the `algo` field pools attach to jobs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum AlgorithmType {
    /// RandomX (CPU-optimized, memory-hard)
    #[clap(name = "randomx")]
    RandomX,

    /// CryptoNight variant 1
    #[clap(name = "cryptonight-v7")]
    CryptoNightV7,

    /// CryptoNight-R (variant 4)
    #[clap(name = "cryptonight-r")]
    CryptoNightR,
}

impl AlgorithmType {
    /// Short name used on the pool wire (`algo` field of a job)
    pub fn wire_name(&self) -> &'static str {
        match self {
            AlgorithmType::RandomX => "rx/0",
            AlgorithmType::CryptoNightV7 => "cn/1",
            AlgorithmType::CryptoNightR => "cn/r",
        }
    }
}

impl fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmType::RandomX => write!(f, "randomx"),
            AlgorithmType::CryptoNightV7 => write!(f, "cryptonight-v7"),
            AlgorithmType::CryptoNightR => write!(f, "cryptonight-r"),
        }
    }
}

impl FromStr for AlgorithmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "randomx" | "rx/0" => Ok(AlgorithmType::RandomX),
            "cnv7" | "cn/1" | "cryptonight-v7" => Ok(AlgorithmType::CryptoNightV7),
            "cnr" | "cn/r" | "cryptonight-r" => Ok(AlgorithmType::CryptoNightR),
            _ => Err(format!("Unknown algorithm: {}", s)),
        }
    }
}
