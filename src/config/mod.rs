// src/config/mod.rs

//! Experiment configuration for expflow.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load an experiment file from disk (`loader.rs`).
//! - Validate axis lists and section settings (`validate.rs`).
//! - Detect which sections changed between two configurations (`diff.rs`).

pub mod diff;
pub mod loader;
pub mod model;
pub mod validate;

pub use diff::{ConfigDiff, diff_configs};
pub use loader::{load_and_validate, load_from_path, parse_str};
pub use model::{
    Axes, ConfigSection, DependenciesSpec, ExperimentConfig, ExperimentSection,
    RawExperimentConfig, SectionConfig, WrapperConfig,
};
