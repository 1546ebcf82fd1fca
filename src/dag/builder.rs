// src/dag/builder.rs

//! Full and incremental graph builds.
//!
//! Build order: expand every section, wire dependencies, prune edgeless
//! jobs, then reduce.

use std::collections::BTreeSet;

use tracing::info;

use crate::config::{ConfigDiff, ExperimentConfig, diff_configs};
use crate::dag::WorkflowGraph;
use crate::dependency::{DependencyResolver, dependents_closure};
use crate::errors::Result;
use crate::job::{JobInstanceExpander, JobName};

/// Summary of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutcome {
    pub created: usize,
    pub reused: usize,
    /// Jobs removed because their instance vanished from the configuration.
    pub removed: Vec<JobName>,
    pub pruned: Vec<JobName>,
    pub edges_wired: usize,
    pub edges_reduced: usize,
    /// Sections whose incoming edges were (re)wired.
    pub rewired: BTreeSet<String>,
}

/// Build a graph from scratch.
pub fn build_graph(config: &ExperimentConfig) -> Result<(WorkflowGraph, BuildOutcome)> {
    let mut graph = WorkflowGraph::new();
    let sections: BTreeSet<String> = config.jobs.keys().cloned().collect();

    let expansion = JobInstanceExpander::new(config).expand_all(&mut graph)?;
    let resolver = DependencyResolver::new(config);
    let wired = resolver.wire_sections(&mut graph, &sections)?;
    let pruned = graph.prune_all_edgeless();
    let reduced = graph.transitive_reduction()?;

    let outcome = BuildOutcome {
        created: expansion.created,
        reused: expansion.reused,
        removed: Vec::new(),
        pruned,
        edges_wired: wired.edges,
        edges_reduced: reduced,
        rewired: sections,
    };
    info!(
        jobs = graph.len(),
        edges = graph.edge_count(),
        reduced = outcome.edges_reduced,
        "built workflow graph"
    );
    Ok((graph, outcome))
}

/// Update `graph` (built from `previous`) to match `current`.
///
/// Only the changed sections and the sections depending on them are
/// re-wired; every other edge is kept as previously reduced.
pub fn rebuild_graph(
    graph: &mut WorkflowGraph,
    previous: &ExperimentConfig,
    current: &ExperimentConfig,
) -> Result<BuildOutcome> {
    let diff = diff_configs(previous, current);
    rebuild_with_diff(graph, current, &diff)
}

pub fn rebuild_with_diff(
    graph: &mut WorkflowGraph,
    current: &ExperimentConfig,
    diff: &ConfigDiff,
) -> Result<BuildOutcome> {
    let affected: BTreeSet<String> = if diff.axes_changed {
        current.jobs.keys().cloned().collect()
    } else {
        let seeds: BTreeSet<String> = diff.changed().union(&diff.removed).cloned().collect();
        dependents_closure(current, &seeds)
            .into_iter()
            .filter(|section| current.jobs.contains_key(section))
            .collect()
    };

    let expander = JobInstanceExpander::new(current);
    let expected: BTreeSet<JobName> = expander.expected_names().into_iter().collect();
    let vanished: Vec<JobName> = graph
        .names()
        .filter(|name| !expected.contains(*name))
        .cloned()
        .collect();
    for name in vanished.iter() {
        graph.remove_node(name);
    }

    let expansion = expander.expand_all(graph)?;

    for section in affected.iter() {
        let names: Vec<JobName> = graph
            .section_jobs(section)
            .iter()
            .map(|job| job.name.clone())
            .collect();
        for name in names {
            graph.clear_parents(&name)?;
        }
    }

    let resolver = DependencyResolver::new(current);
    let wired = resolver.wire_sections(graph, &affected)?;
    let pruned = graph.prune_all_edgeless();
    let reduced = graph.transitive_reduction()?;

    info!(
        removed = vanished.len(),
        rewired = affected.len(),
        jobs = graph.len(),
        edges = graph.edge_count(),
        "rebuilt workflow graph incrementally"
    );

    Ok(BuildOutcome {
        created: expansion.created,
        reused: expansion.reused,
        removed: vanished,
        pruned,
        edges_wired: wired.edges,
        edges_reduced: reduced,
        rewired: affected,
    })
}
