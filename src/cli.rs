// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `expflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "expflow",
    version,
    about = "Expand, wire and drive experiment workflows.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the experiment file (TOML).
    ///
    /// Default: `Experiment.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Experiment.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `EXPFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Build the graph and print its reduced edges (no execution).
    Graph,

    /// Print the submission order of every wrapper.
    Order,

    /// Run the experiment to completion against a simulated platform.
    Simulate {
        /// Job that fails on every attempt (repeatable).
        #[arg(long, value_name = "NAME")]
        fail: Vec<String>,

        /// Snapshot file to resume from and persist to.
        #[arg(long, value_name = "PATH")]
        state: Option<PathBuf>,

        /// Milliseconds between simulated status reports.
        #[arg(long, value_name = "MS", default_value_t = 0)]
        step_ms: u64,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
