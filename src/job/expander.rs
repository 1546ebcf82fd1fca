// src/job/expander.rs

//! Expansion of sections into concrete job instances.

use tracing::{debug, info};

use crate::config::{Axes, ExperimentConfig, SectionConfig};
use crate::dag::WorkflowGraph;
use crate::errors::{ExpflowError, Result};
use crate::job::instance::{Coordinates, Job, JobKey, JobName};
use crate::job::status::Status;
use crate::types::{RunningType, Synchronize};

/// Keep every `frequency`-th element (1-based) plus the last one.
fn thin<T: Clone>(items: &[T], frequency: u32) -> Vec<T> {
    let frequency = frequency.max(1) as usize;
    let len = items.len();
    items
        .iter()
        .enumerate()
        .filter(|(i, _)| (i + 1) % frequency == 0 || i + 1 == len)
        .map(|(_, item)| item.clone())
        .collect()
}

/// Keys of every instance a section expands to, in creation order
/// (date, member, chunk, split).
pub fn instance_keys(section: &str, cfg: &SectionConfig, axes: &Axes) -> Vec<JobKey> {
    let mut slots: Vec<Coordinates> = Vec::new();

    match cfg.running {
        RunningType::Once => slots.push(Coordinates::default()),
        RunningType::Date => {
            for date in thin(&axes.dates, cfg.frequency) {
                slots.push(Coordinates {
                    date: Some(date),
                    ..Coordinates::default()
                });
            }
        }
        RunningType::Member => {
            for date in axes.dates.iter() {
                for member in thin(&axes.members, cfg.frequency) {
                    slots.push(Coordinates {
                        date: Some(*date),
                        member: Some(member),
                        ..Coordinates::default()
                    });
                }
            }
        }
        RunningType::Chunk => {
            let chunks: Vec<u32> = thin(&axes.chunks, cfg.frequency)
                .into_iter()
                .filter(|c| cfg.delay.is_none_or(|delay| *c > delay))
                .collect();

            match cfg.synchronize {
                Some(Synchronize::Date) => {
                    for chunk in chunks.iter() {
                        slots.push(Coordinates {
                            chunk: Some(*chunk),
                            ..Coordinates::default()
                        });
                    }
                }
                Some(Synchronize::Member) => {
                    for date in axes.dates.iter() {
                        for chunk in chunks.iter() {
                            slots.push(Coordinates {
                                date: Some(*date),
                                chunk: Some(*chunk),
                                ..Coordinates::default()
                            });
                        }
                    }
                }
                None => {
                    for date in axes.dates.iter() {
                        for member in axes.members.iter() {
                            for chunk in chunks.iter() {
                                slots.push(Coordinates {
                                    date: Some(*date),
                                    member: Some(member.clone()),
                                    chunk: Some(*chunk),
                                    split: None,
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    let splits = cfg.split_count();
    let mut keys = Vec::with_capacity(slots.len() * splits.max(1) as usize);
    for slot in slots {
        if splits == 0 {
            keys.push(JobKey {
                section: section.to_string(),
                coords: slot,
            });
        } else {
            for split in 1..=splits {
                keys.push(JobKey {
                    section: section.to_string(),
                    coords: Coordinates {
                        split: Some(split),
                        ..slot.clone()
                    },
                });
            }
        }
    }
    keys
}

/// Counts reported by [`JobInstanceExpander::expand_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionStats {
    pub created: usize,
    pub reused: usize,
}

/// Materializes instances into a [`WorkflowGraph`].
///
/// Expanding a name that already exists reuses the existing job: its
/// section-level attributes are refreshed and a pre-run status is reset
/// to `WAITING`; any other status is left untouched.
#[derive(Debug, Clone, Copy)]
pub struct JobInstanceExpander<'a> {
    config: &'a ExperimentConfig,
}

impl<'a> JobInstanceExpander<'a> {
    pub fn new(config: &'a ExperimentConfig) -> Self {
        Self { config }
    }

    pub fn expand_all(&self, graph: &mut WorkflowGraph) -> Result<ExpansionStats> {
        let mut stats = ExpansionStats::default();
        for section in self.config.jobs.keys() {
            let section_stats = self.expand_section(graph, section)?;
            stats.created += section_stats.created;
            stats.reused += section_stats.reused;
        }
        info!(
            created = stats.created,
            reused = stats.reused,
            "expanded job instances"
        );
        Ok(stats)
    }

    pub fn expand_section(&self, graph: &mut WorkflowGraph, section: &str) -> Result<ExpansionStats> {
        let cfg = self.config.section(section).ok_or_else(|| {
            ExpflowError::ConfigError(format!("unknown section '{section}'"))
        })?;

        let mut stats = ExpansionStats::default();
        for key in instance_keys(section, cfg, &self.config.axes) {
            let name = key.job_name(self.config.expid());
            match graph.get_mut(&name) {
                Some(existing) => {
                    self.apply_section(existing, cfg);
                    if existing.status.is_pre_run() && existing.status != Status::Waiting {
                        debug!(job = %name, from = %existing.status, "resetting pre-run status");
                        existing.status = Status::Waiting;
                        existing.delay_end = None;
                        existing.hold = false;
                    }
                    stats.reused += 1;
                }
                None => {
                    let mut job = Job::new(name, &key, cfg.running);
                    self.apply_section(&mut job, cfg);
                    graph.add_or_update_node(job);
                    stats.created += 1;
                }
            }
        }

        debug!(
            section = %section,
            created = stats.created,
            reused = stats.reused,
            "expanded section"
        );
        Ok(stats)
    }

    /// Names every instance of the current configuration would carry.
    pub fn expected_names(&self) -> Vec<JobName> {
        self.config
            .jobs
            .iter()
            .flat_map(|(section, cfg)| instance_keys(section, cfg, &self.config.axes))
            .map(|key| key.job_name(self.config.expid()))
            .collect()
    }

    fn apply_section(&self, job: &mut Job, cfg: &SectionConfig) {
        job.running = cfg.running;
        job.splits = cfg.split_count();
        job.frequency = cfg.frequency;
        job.synchronize = cfg.synchronize;
        job.dependencies = cfg.dependencies.keys();
        job.skippable = cfg.skippable;
        job.delete_when_edgeless = cfg.delete_when_edgeless;
        job.retrials = self.config.effective_retrials(cfg);
        job.delay_retry = self.config.effective_delay_retry(cfg);
    }
}
