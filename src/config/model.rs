// src/config/model.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::job::StartDate;
use crate::types::{RetryDelay, RunningType, Synchronize};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [experiment]
/// expid = "a000"
/// dates = ["20000101"]
/// members = ["fc0", "fc1"]
/// num_chunks = 3
///
/// [config]
/// retrials = 1
///
/// [jobs.INI]
/// running = "member"
///
/// [jobs.SIM]
/// running = "chunk"
/// dependencies = "INI SIM-1"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawExperimentConfig {
    /// Axis lists from `[experiment]`.
    pub experiment: ExperimentSection,

    /// Global behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Job sections from `[jobs.<SECTION>]`.
    #[serde(default)]
    pub jobs: BTreeMap<String, SectionConfig>,

    /// Wrapper groups from `[wrappers.<name>]`.
    #[serde(default)]
    pub wrappers: BTreeMap<String, WrapperConfig>,
}

/// `[experiment]` section: identifier and the axis lists every section
/// expands over.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExperimentSection {
    pub expid: String,

    /// Start dates as `YYYYMMDD[HH[MM]]` strings.
    #[serde(default)]
    pub dates: Vec<String>,

    #[serde(default)]
    pub members: Vec<String>,

    #[serde(default)]
    pub num_chunks: u32,

    /// First chunk number (chunks run `chunk_ini..=num_chunks`).
    #[serde(default = "default_chunk_ini")]
    pub chunk_ini: u32,
}

fn default_chunk_ini() -> u32 {
    1
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConfigSection {
    /// Stage jobs as PREPARED + held once all parents are queuing.
    #[serde(default)]
    pub remote_dependencies: bool,

    /// Default retrials for sections that do not override it.
    #[serde(default)]
    pub retrials: u32,

    /// Default retry delay policy.
    #[serde(default)]
    pub delay_retry_time: RetryDelay,

    /// Seconds between orchestration cycles in the runtime.
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
}

fn default_cycle_interval_secs() -> u64 {
    10
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            remote_dependencies: false,
            retrials: 0,
            delay_retry_time: RetryDelay::default(),
            cycle_interval_secs: default_cycle_interval_secs(),
        }
    }
}

/// Dependency declaration of a section.
///
/// Either the compact string form (`"INI SIM-1 CLEAN?"`) or a table keyed
/// by dependency key whose values hold relationship filters:
///
/// ```toml
/// [jobs.POST.dependencies.SIM]
/// STATUS = "RUNNING"
/// [jobs.POST.dependencies.SIM.DATES_FROM."20000101"]
/// MEMBERS_TO = "fc0"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum DependenciesSpec {
    Keys(String),
    Table(BTreeMap<String, toml::Value>),
}

impl Default for DependenciesSpec {
    fn default() -> Self {
        DependenciesSpec::Keys(String::new())
    }
}

impl DependenciesSpec {
    /// Dependency keys: declaration order for the string form, key order
    /// (alphabetical) for the table form.
    pub fn keys(&self) -> Vec<String> {
        match self {
            DependenciesSpec::Keys(s) => s.split_whitespace().map(str::to_string).collect(),
            DependenciesSpec::Table(t) => t.keys().cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DependenciesSpec::Keys(s) => s.trim().is_empty(),
            DependenciesSpec::Table(t) => t.is_empty(),
        }
    }

    /// Relationship payload for a key, if the table form carries one.
    pub fn relationships_of(&self, key: &str) -> Option<&toml::Value> {
        match self {
            DependenciesSpec::Keys(_) => None,
            DependenciesSpec::Table(t) => t.get(key),
        }
    }
}

/// `[jobs.<SECTION>]` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SectionConfig {
    #[serde(default)]
    pub running: RunningType,

    #[serde(default)]
    pub dependencies: DependenciesSpec,

    /// Keep only every N-th instance along the running axis (plus the last).
    #[serde(default = "default_frequency")]
    pub frequency: u32,

    /// Number of splits per slot; zero or negative (conventionally `-1`)
    /// means unsplit.
    #[serde(default)]
    pub splits: i32,

    /// Skip chunks `<= delay`.
    #[serde(default)]
    pub delay: Option<u32>,

    #[serde(default)]
    pub synchronize: Option<Synchronize>,

    /// Overrides `[config].retrials`.
    #[serde(default)]
    pub retrials: Option<u32>,

    /// Overrides `[config].delay_retry_time`.
    #[serde(default)]
    pub delay_retry_time: Option<RetryDelay>,

    /// Older chunks/members are skipped once a newer one is ready.
    #[serde(default)]
    pub skippable: bool,

    /// Remove instances left without any edge after dependency wiring.
    #[serde(default = "default_delete_when_edgeless")]
    pub delete_when_edgeless: bool,
}

impl SectionConfig {
    /// Split count, with every value `<= 0` read as unsplit.
    pub fn split_count(&self) -> u32 {
        u32::try_from(self.splits).unwrap_or(0)
    }
}

fn default_frequency() -> u32 {
    1
}

fn default_delete_when_edgeless() -> bool {
    true
}

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            running: RunningType::default(),
            dependencies: DependenciesSpec::default(),
            frequency: default_frequency(),
            splits: 0,
            delay: None,
            synchronize: None,
            retrials: None,
            delay_retry_time: None,
            skippable: false,
            delete_when_edgeless: default_delete_when_edgeless(),
        }
    }
}

/// `[wrappers.<name>]` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct WrapperConfig {
    /// Sections whose instances are packed into this wrapper.
    #[serde(default)]
    pub jobs: Vec<String>,
}

/// Parsed axis lists.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Axes {
    pub dates: Vec<StartDate>,
    pub members: Vec<String>,
    pub chunks: Vec<u32>,
}

impl Axes {
    pub fn date_position(&self, date: &StartDate) -> Option<usize> {
        self.dates.iter().position(|d| d == date)
    }

    pub fn member_position(&self, member: &str) -> Option<usize> {
        self.members.iter().position(|m| m == member)
    }

    pub fn chunk_position(&self, chunk: u32) -> Option<usize> {
        self.chunks.iter().position(|c| *c == chunk)
    }
}

/// Validated experiment configuration.
///
/// Construct through `ExperimentConfig::try_from(RawExperimentConfig)` (see
/// `config::validate`), which also parses the axis lists.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExperimentConfig {
    pub experiment: ExperimentSection,
    pub config: ConfigSection,
    pub jobs: BTreeMap<String, SectionConfig>,
    pub wrappers: BTreeMap<String, WrapperConfig>,
    pub axes: Axes,
}

impl ExperimentConfig {
    pub(crate) fn new_unchecked(raw: RawExperimentConfig, axes: Axes) -> Self {
        Self {
            experiment: raw.experiment,
            config: raw.config,
            jobs: raw.jobs,
            wrappers: raw.wrappers,
            axes,
        }
    }

    pub fn expid(&self) -> &str {
        &self.experiment.expid
    }

    pub fn section(&self, name: &str) -> Option<&SectionConfig> {
        self.jobs.get(name)
    }

    pub fn effective_retrials(&self, section: &SectionConfig) -> u32 {
        section.retrials.unwrap_or(self.config.retrials)
    }

    pub fn effective_delay_retry(&self, section: &SectionConfig) -> RetryDelay {
        section.delay_retry_time.unwrap_or(self.config.delay_retry_time)
    }
}
