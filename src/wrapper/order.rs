// src/wrapper/order.rs

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::ExperimentConfig;
use crate::dag::WorkflowGraph;
use crate::errors::{ExpflowError, Result};
use crate::job::{Job, JobName, StartDate};
use crate::types::RunningType;

/// Contiguous jobs sharing a running type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrapperRun {
    pub running: RunningType,
    pub jobs: Vec<JobName>,
}

/// Ordered jobs of one (date, member) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrapperGroup {
    pub date: Option<StartDate>,
    pub member: Option<String>,
    pub runs: Vec<WrapperRun>,
}

impl WrapperGroup {
    /// Job names in submission order.
    pub fn job_names(&self) -> Vec<&JobName> {
        self.runs.iter().flat_map(|run| run.jobs.iter()).collect()
    }
}

/// Sort key standing in for a job. Jobs without a date or member borrow
/// the last value of that axis, and jobs without a chunk the last chunk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SortProxy {
    date: usize,
    member: usize,
    chunk: u32,
    split: u32,
    section: usize,
    name: JobName,
    running: RunningType,
}

#[derive(Debug, Clone, Copy)]
pub struct WrapperOrderer<'a> {
    config: &'a ExperimentConfig,
}

impl<'a> WrapperOrderer<'a> {
    pub fn new(config: &'a ExperimentConfig) -> Self {
        Self { config }
    }

    /// Order of every configured wrapper, keyed by wrapper name.
    pub fn order_all(&self, graph: &WorkflowGraph) -> BTreeMap<String, Vec<WrapperGroup>> {
        self.config
            .wrappers
            .iter()
            .map(|(name, wrapper)| (name.clone(), self.order_sections(graph, &wrapper.jobs)))
            .collect()
    }

    pub fn order_wrapper(&self, graph: &WorkflowGraph, wrapper: &str) -> Result<Vec<WrapperGroup>> {
        let cfg = self.config.wrappers.get(wrapper).ok_or_else(|| {
            ExpflowError::ConfigError(format!("unknown wrapper '{wrapper}'"))
        })?;
        Ok(self.order_sections(graph, &cfg.jobs))
    }

    /// Instances of `sections`, one ordered list per (date, member).
    pub fn order_sections(&self, graph: &WorkflowGraph, sections: &[String]) -> Vec<WrapperGroup> {
        let mut groups: BTreeMap<(usize, usize), Vec<SortProxy>> = BTreeMap::new();
        for (section_idx, section) in sections.iter().enumerate() {
            for job in graph.section_jobs(section) {
                let proxy = self.proxy(job, section_idx);
                groups.entry((proxy.date, proxy.member)).or_default().push(proxy);
            }
        }

        groups
            .into_iter()
            .map(|((date, member), mut proxies)| {
                proxies.sort();
                WrapperGroup {
                    date: self.config.axes.dates.get(date).copied(),
                    member: self.config.axes.members.get(member).cloned(),
                    runs: into_runs(proxies),
                }
            })
            .collect()
    }

    fn proxy(&self, job: &Job, section: usize) -> SortProxy {
        let axes = &self.config.axes;
        let last_date = axes.dates.len().saturating_sub(1);
        let last_member = axes.members.len().saturating_sub(1);
        let last_chunk = axes.chunks.last().copied().unwrap_or(self.config.experiment.num_chunks);

        SortProxy {
            date: job
                .date
                .as_ref()
                .and_then(|d| axes.date_position(d))
                .unwrap_or(last_date),
            member: job
                .member
                .as_deref()
                .and_then(|m| axes.member_position(m))
                .unwrap_or(last_member),
            chunk: job.chunk.unwrap_or(last_chunk),
            split: job.split.unwrap_or(0),
            section,
            name: job.name.clone(),
            running: job.running,
        }
    }
}

fn into_runs(proxies: Vec<SortProxy>) -> Vec<WrapperRun> {
    let mut runs: Vec<WrapperRun> = Vec::new();
    for proxy in proxies {
        match runs.last_mut() {
            Some(run) if run.running == proxy.running => run.jobs.push(proxy.name),
            _ => runs.push(WrapperRun {
                running: proxy.running,
                jobs: vec![proxy.name],
            }),
        }
    }
    runs
}
