// src/logging.rs

//! Logging setup for `expflow` using `tracing` + `tracing-subscriber`.
//!
//! The filter is built from, in order of precedence:
//! 1. `--log-level` (applies to every target)
//! 2. `EXPFLOW_LOG`, a full filter directive such as
//!    `"info,expflow::status=debug"`
//! 3. `info`
//!
//! Logs go to STDERR so that `graph`/`order` output on stdout stays
//! machine-readable.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "EXPFLOW_LOG";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref())?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("installing the tracing subscriber: {err}"))?;

    Ok(())
}

fn build_filter(cli_level: Option<LogLevel>, env_directive: Option<&str>) -> Result<EnvFilter> {
    if let Some(level) = cli_level {
        return Ok(EnvFilter::new(level.as_directive()));
    }
    match env_directive.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid {LOG_ENV} directive {directive:?}")),
        None => Ok(EnvFilter::new("info")),
    }
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
