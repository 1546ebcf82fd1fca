// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ExperimentConfig, RawExperimentConfig};
use crate::errors::Result;

/// Load an experiment file from a given path and return the raw
/// `RawExperimentConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (axis lists, section sanity). Use [`load_and_validate`] for
/// that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawExperimentConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    parse_str(&contents)
}

/// Parse experiment TOML already held in memory.
pub fn parse_str(contents: &str) -> Result<RawExperimentConfig> {
    let config: RawExperimentConfig = toml::from_str(contents)?;
    Ok(config)
}

/// Load an experiment file from path and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Parses start dates and the chunk range.
/// - Checks section sanity (frequency, synchronize, required axes) and
///   wrapper references.
///
/// Unknown dependency targets are not rejected here; the resolver drops
/// them with a warning.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ExperimentConfig> {
    let raw_config = load_from_path(&path)?;
    let config = ExperimentConfig::try_from(raw_config)?;
    Ok(config)
}

/// Default experiment file in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Experiment.toml")
}
