// src/cli/commands.rs
use crate::types::AlgorithmType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// XMR CC Miner - remotely controllable Monero miner in Rust
#[derive(Parser, Debug)]
#[command(name = "xmr-cc-miner")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (start mining or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the miner application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Start mining with the given configuration
    Start(StartOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for starting the mining operation
#[derive(Parser, Debug)]
pub struct StartOptions {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Number of worker threads to use (overrides config)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Mining algorithm to use (overrides config)
    #[arg(short, long)]
    pub algorithm: Option<AlgorithmType>,

    /// Skip the hash self-test (overrides config)
    #[arg(long)]
    pub skip_self_check: bool,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,

    /// Include the remote control section
    #[arg(short = 'C', long)]
    pub control: bool,
}
