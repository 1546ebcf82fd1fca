// src/persistence/snapshot.rs

use serde::{Deserialize, Serialize};

use crate::config::ExperimentConfig;
use crate::dag::WorkflowGraph;
use crate::errors::Result;
use crate::job::{EdgeInfo, Job, JobName};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEdge {
    pub parent: JobName,
    pub child: JobName,
    pub info: EdgeInfo,
}

/// Everything needed to resume an experiment: the configuration the graph
/// was built from, the jobs with their run-time state, and the reduced
/// edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub config: ExperimentConfig,
    pub jobs: Vec<Job>,
    pub edges: Vec<SnapshotEdge>,
}

impl WorkflowGraph {
    pub fn to_snapshot(&self, config: &ExperimentConfig) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            config: config.clone(),
            jobs: self.jobs().cloned().collect(),
            edges: self
                .edges()
                .into_iter()
                .map(|(parent, child, info)| SnapshotEdge {
                    parent,
                    child,
                    info,
                })
                .collect(),
        }
    }

    /// Rebuild a graph from a snapshot. An edge naming a missing job is a
    /// `JobNotFound` error.
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<WorkflowGraph> {
        let mut jobs = snapshot.jobs.clone();
        jobs.sort_by_key(|job| job.priority);

        let mut graph = WorkflowGraph::new();
        for job in jobs {
            graph.restore_node(job);
        }
        for edge in snapshot.edges.iter() {
            graph.add_edge(&edge.parent, &edge.child, edge.info)?;
        }
        Ok(graph)
    }
}
