// src/config/diff.rs

//! Per-section change detection between two experiment configurations.

use std::collections::BTreeSet;

use crate::config::model::ExperimentConfig;

/// What changed between a previous and a current configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    /// Expid or axis lists differ; every section must be rebuilt.
    pub axes_changed: bool,
}

impl ConfigDiff {
    pub fn is_empty(&self) -> bool {
        !self.axes_changed
            && self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
    }

    /// Sections present in the new configuration that need re-wiring
    /// because they were added or modified.
    pub fn changed(&self) -> BTreeSet<String> {
        self.added.union(&self.modified).cloned().collect()
    }
}

pub fn diff_configs(previous: &ExperimentConfig, current: &ExperimentConfig) -> ConfigDiff {
    let mut diff = ConfigDiff {
        axes_changed: previous.experiment != current.experiment || previous.axes != current.axes,
        ..ConfigDiff::default()
    };

    for (name, section) in current.jobs.iter() {
        match previous.jobs.get(name) {
            None => {
                diff.added.insert(name.clone());
            }
            Some(old) if old != section => {
                diff.modified.insert(name.clone());
            }
            Some(_) => {}
        }
    }

    for name in previous.jobs.keys() {
        if !current.jobs.contains_key(name) {
            diff.removed.insert(name.clone());
        }
    }

    // Retry defaults feed every section that does not override them.
    if previous.config.retrials != current.config.retrials
        || previous.config.delay_retry_time != current.config.delay_retry_time
    {
        for (name, section) in current.jobs.iter() {
            if section.retrials.is_none() || section.delay_retry_time.is_none() {
                if !diff.added.contains(name) {
                    diff.modified.insert(name.clone());
                }
            }
        }
    }

    diff
}
