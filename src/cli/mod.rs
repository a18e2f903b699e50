// src/cli/mod.rs
//! Command-line and console surfaces

/// clap command definitions
pub mod commands;

/// Single-key console commands read from stdin
pub mod console;

pub use commands::{Action, Commands, ConfigOptions, StartOptions};
pub use console::ConsoleCommand;
