#![allow(dead_code)]

use std::collections::BTreeMap;

use expflow::config::{
    ConfigSection, DependenciesSpec, ExperimentConfig, ExperimentSection, RawExperimentConfig,
    SectionConfig, WrapperConfig,
};
use expflow::types::{RetryDelay, RunningType, Synchronize};

/// Builder for `ExperimentConfig` to simplify test setup.
///
/// Starts from expid `a000`, one start date, one member and no chunks.
pub struct ExperimentConfigBuilder {
    config: RawExperimentConfig,
}

impl ExperimentConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawExperimentConfig {
                experiment: ExperimentSection {
                    expid: "a000".to_string(),
                    dates: vec!["20000101".to_string()],
                    members: vec!["fc0".to_string()],
                    num_chunks: 0,
                    chunk_ini: 1,
                },
                config: ConfigSection::default(),
                jobs: BTreeMap::new(),
                wrappers: BTreeMap::new(),
            },
        }
    }

    pub fn expid(mut self, expid: &str) -> Self {
        self.config.experiment.expid = expid.to_string();
        self
    }

    pub fn dates(mut self, dates: &[&str]) -> Self {
        self.config.experiment.dates = dates.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn members(mut self, members: &[&str]) -> Self {
        self.config.experiment.members = members.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn chunks(mut self, num_chunks: u32) -> Self {
        self.config.experiment.num_chunks = num_chunks;
        self
    }

    pub fn retrials(mut self, retrials: u32) -> Self {
        self.config.config.retrials = retrials;
        self
    }

    pub fn delay_retry(mut self, policy: &str) -> Self {
        self.config.config.delay_retry_time = parse_delay(policy);
        self
    }

    pub fn remote_dependencies(mut self, enabled: bool) -> Self {
        self.config.config.remote_dependencies = enabled;
        self
    }

    pub fn with_section(mut self, name: &str, section: SectionConfig) -> Self {
        self.config.jobs.insert(name.to_string(), section);
        self
    }

    pub fn with_wrapper(mut self, name: &str, sections: &[&str]) -> Self {
        self.config.wrappers.insert(
            name.to_string(),
            WrapperConfig {
                jobs: sections.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn build_raw(self) -> RawExperimentConfig {
        self.config
    }

    pub fn build(self) -> ExperimentConfig {
        ExperimentConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ExperimentConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `SectionConfig`.
pub struct SectionBuilder {
    section: SectionConfig,
}

impl SectionBuilder {
    pub fn new(running: RunningType) -> Self {
        Self {
            section: SectionConfig {
                running,
                ..SectionConfig::default()
            },
        }
    }

    pub fn once() -> Self {
        Self::new(RunningType::Once)
    }

    pub fn date() -> Self {
        Self::new(RunningType::Date)
    }

    pub fn member() -> Self {
        Self::new(RunningType::Member)
    }

    pub fn chunk() -> Self {
        Self::new(RunningType::Chunk)
    }

    /// Compact string form, e.g. `"INI SIM-1"`.
    pub fn deps(mut self, keys: &str) -> Self {
        self.section.dependencies = DependenciesSpec::Keys(keys.to_string());
        self
    }

    pub fn frequency(mut self, frequency: u32) -> Self {
        self.section.frequency = frequency;
        self
    }

    pub fn splits(mut self, splits: i32) -> Self {
        self.section.splits = splits;
        self
    }

    pub fn delay(mut self, delay: u32) -> Self {
        self.section.delay = Some(delay);
        self
    }

    pub fn synchronize(mut self, axis: Synchronize) -> Self {
        self.section.synchronize = Some(axis);
        self
    }

    pub fn retrials(mut self, retrials: u32) -> Self {
        self.section.retrials = Some(retrials);
        self
    }

    pub fn delay_retry(mut self, policy: &str) -> Self {
        self.section.delay_retry_time = Some(parse_delay(policy));
        self
    }

    pub fn skippable(mut self, val: bool) -> Self {
        self.section.skippable = val;
        self
    }

    pub fn delete_when_edgeless(mut self, val: bool) -> Self {
        self.section.delete_when_edgeless = val;
        self
    }

    pub fn build(self) -> SectionConfig {
        self.section
    }
}

fn parse_delay(policy: &str) -> RetryDelay {
    policy.parse().expect("valid delay_retry_time in test")
}
