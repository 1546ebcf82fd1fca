#![allow(dead_code)]

pub use expflow_test_utils::builders::{ExperimentConfigBuilder, SectionBuilder};
pub use expflow_test_utils::fakes::{FakeBackend, RecordingPlatform, SilentBackend};
pub use expflow_test_utils::{init_tracing, t0, with_timeout};

use expflow::config::{ExperimentConfig, parse_str};

/// Parse and validate experiment TOML held in a test.
pub fn config_from_toml(src: &str) -> ExperimentConfig {
    let raw = parse_str(src).expect("test TOML parses");
    ExperimentConfig::try_from(raw).expect("test config is valid")
}

/// Name of an instance of `section` in experiment `a000`.
///
/// `parts` are the discriminating coordinates in name order (date,
/// member, chunk, split).
pub fn job(parts: &[&str], section: &str) -> String {
    let mut name = String::from("a000");
    for part in parts {
        name.push('_');
        name.push_str(part);
    }
    name.push('_');
    name.push_str(section);
    name
}
