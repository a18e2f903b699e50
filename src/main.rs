// src/main.rs
use clap::Parser;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use xmr_cc_miner::engine::{self, FATAL_EXIT_CODE};
use xmr_cc_miner::utils::logging::parse_level;
use xmr_cc_miner::{self, *};

/// Main entry point for the miner
///
/// # Exit codes
/// - `0` after a clean shutdown
/// - `4` when a restart was requested
/// - `22` on a fatal startup error
fn main() -> ExitCode {
    let cli = cli::Commands::parse();

    let result = match cli.action {
        cli::Action::Start(opts) => start_mining(opts),
        cli::Action::Config(opts) => generate_config(opts).map(|()| 0),
    };

    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            init_logging(log::LevelFilter::Info);
            log::error!("{}", e);
            ExitCode::from(FATAL_EXIT_CODE as u8)
        }
    }
}

/// Starts the miner and runs it until shutdown or restart
///
/// # Arguments
/// * `opts` - Command line options for mining operation
///
/// # Operations
/// 1. Loads configuration and applies CLI overrides
/// 2. Initializes logging at the configured level
/// 3. Runs the engine on a tokio runtime
fn start_mining(opts: cli::StartOptions) -> Result<i32, MinerError> {
    let mut config = config::load(&opts.config)?;
    // Apply CLI overrides
    if let Some(threads) = opts.threads {
        config.threads = threads;
    }
    if let Some(algo) = opts.algorithm {
        config.algorithm = algo.to_string();
    }
    if opts.skip_self_check {
        config.skip_self_check = true;
    }
    config.validate()?;

    init_logging(parse_level(&config.log_level));

    let rt = Runtime::new()?;
    let status = rt.block_on(engine::run(config))?;
    // Worker threads are joined already; pending stdin reads must not hold us.
    rt.shutdown_background();
    Ok(status.code())
}

/// Generates configuration template file
///
/// # Arguments
/// * `opts` - Configuration generation options
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    let config = config::generate_template(opts.control);
    std::fs::write(&opts.output, config)?;
    println!("configuration template written to {}", opts.output.display());
    Ok(())
}
