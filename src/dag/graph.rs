// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use tracing::{debug, info};

use crate::dag::reduction::redundant_edges;
use crate::errors::{ExpflowError, Result};
use crate::job::{EdgeInfo, Job, JobKey, JobName, Selection, Status};

/// DAG of job instances.
///
/// Jobs are stored by name; the petgraph structure only carries names on
/// nodes and the edge condition on edges. Every mutation keeps
/// `Job::parents`, `Job::children` and `Job::edge_info` consistent with
/// the adjacency.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    graph: StableDiGraph<JobName, EdgeInfo>,
    nodes: HashMap<JobName, NodeIndex>,
    jobs: BTreeMap<JobName, Job>,
    keys: HashMap<JobKey, JobName>,
    sections: HashMap<String, BTreeSet<JobName>>,
    next_priority: u32,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }

    /// Mutable access to a job's payload.
    ///
    /// Adjacency fields (`parents`, `children`, `edge_info`) must only be
    /// changed through the graph methods.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Job> {
        self.jobs.get_mut(name)
    }

    pub fn try_get(&self, name: &str) -> Result<&Job> {
        self.jobs
            .get(name)
            .ok_or_else(|| ExpflowError::JobNotFound(name.to_string()))
    }

    pub fn job_by_key(&self, key: &JobKey) -> Option<&Job> {
        self.keys.get(key).and_then(|name| self.jobs.get(name))
    }

    /// All jobs, ordered by name.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &JobName> {
        self.jobs.keys()
    }

    /// Instances of `section` in creation order.
    pub fn section_jobs(&self, section: &str) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self
            .sections
            .get(section)
            .into_iter()
            .flatten()
            .filter_map(|name| self.jobs.get(name))
            .collect();
        jobs.sort_by_key(|job| job.priority);
        jobs
    }

    /// Instances of `section` matching `selection`; omitted axes expand
    /// over every value.
    pub fn select(&self, section: &str, selection: &Selection) -> Vec<&Job> {
        self.section_jobs(section)
            .into_iter()
            .filter(|job| selection.matches(&job.coordinates()))
            .collect()
    }

    /// Insert a job, or replace the payload of an existing job with the
    /// same name while keeping its edges and priority.
    pub fn add_or_update_node(&mut self, mut job: Job) {
        if let Some(existing) = self.jobs.get(&job.name) {
            job.priority = existing.priority;
            job.parents = existing.parents.clone();
            job.children = existing.children.clone();
            job.edge_info = existing.edge_info.clone();
            self.jobs.insert(job.name.clone(), job);
            return;
        }

        job.priority = self.next_priority;
        self.next_priority += 1;

        let idx = self.graph.add_node(job.name.clone());
        self.nodes.insert(job.name.clone(), idx);
        self.keys.insert(job.key(), job.name.clone());
        self.sections
            .entry(job.section.clone())
            .or_default()
            .insert(job.name.clone());
        self.jobs.insert(job.name.clone(), job);
    }

    /// Insert a job restored from a snapshot, keeping its priority.
    pub(crate) fn restore_node(&mut self, mut job: Job) {
        job.parents.clear();
        job.children.clear();
        job.edge_info.clear();
        let priority = job.priority;
        let name = job.name.clone();
        self.add_or_update_node(job);
        if let Some(restored) = self.jobs.get_mut(&name) {
            restored.priority = priority;
        }
        self.next_priority = self.next_priority.max(priority.saturating_add(1));
    }

    /// Wire `parent -> child`. An existing edge has its condition merged.
    /// Self-edges are ignored.
    pub fn add_edge(&mut self, parent: &str, child: &str, info: EdgeInfo) -> Result<()> {
        let p = self.index_of(parent)?;
        let c = self.index_of(child)?;
        if p == c {
            debug!(job = %parent, "ignoring self-edge");
            return Ok(());
        }

        let info = match self.graph.find_edge(p, c) {
            Some(edge) => {
                let merged = self.graph[edge].merge(info);
                self.graph[edge] = merged;
                merged
            }
            None => {
                self.graph.add_edge(p, c, info);
                info
            }
        };

        if let Some(job) = self.jobs.get_mut(parent) {
            job.children.insert(child.to_string());
        }
        if let Some(job) = self.jobs.get_mut(child) {
            job.parents.insert(parent.to_string());
            if info == EdgeInfo::default() {
                job.edge_info.remove(parent);
            } else {
                job.edge_info.insert(parent.to_string(), info);
            }
        }
        // Parents remember the furthest step any child waits for.
        if info.from_step > 0 {
            if let Some(job) = self.jobs.get_mut(parent) {
                job.max_checkpoint_step = job.max_checkpoint_step.max(info.from_step);
            }
        }
        Ok(())
    }

    pub fn remove_edge(&mut self, parent: &str, child: &str) -> bool {
        let (Some(&p), Some(&c)) = (self.nodes.get(parent), self.nodes.get(child)) else {
            return false;
        };
        let Some(edge) = self.graph.find_edge(p, c) else {
            return false;
        };
        self.graph.remove_edge(edge);
        self.unlink(parent, child);
        true
    }

    fn unlink(&mut self, parent: &str, child: &str) {
        if let Some(job) = self.jobs.get_mut(parent) {
            job.children.remove(child);
        }
        if let Some(job) = self.jobs.get_mut(child) {
            job.parents.remove(parent);
            job.edge_info.remove(parent);
        }
    }

    /// Remove a job and every edge touching it.
    pub fn remove_node(&mut self, name: &str) -> Option<Job> {
        let idx = self.nodes.remove(name)?;
        let job = self.jobs.remove(name)?;

        for parent in job.parents.iter() {
            if let Some(p) = self.jobs.get_mut(parent) {
                p.children.remove(name);
            }
        }
        for child in job.children.iter() {
            if let Some(c) = self.jobs.get_mut(child) {
                c.parents.remove(name);
                c.edge_info.remove(name);
            }
        }

        self.graph.remove_node(idx);
        self.keys.remove(&job.key());
        if let Some(names) = self.sections.get_mut(&job.section) {
            names.remove(name);
            if names.is_empty() {
                self.sections.remove(&job.section);
            }
        }
        debug!(job = %name, "removed job");
        Some(job)
    }

    /// Drop every incoming edge of `name`.
    pub fn clear_parents(&mut self, name: &str) -> Result<usize> {
        let idx = self.index_of(name)?;
        let incoming: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.id(), e.source()))
            .collect();
        let count = incoming.len();
        for (edge, source) in incoming {
            self.graph.remove_edge(edge);
            let parent = self.graph[source].clone();
            self.unlink(&parent, name);
        }
        Ok(count)
    }

    pub fn parents_of(&self, name: &str) -> Vec<&Job> {
        self.neighbours(name, Direction::Incoming)
    }

    pub fn children_of(&self, name: &str) -> Vec<&Job> {
        self.neighbours(name, Direction::Outgoing)
    }

    fn neighbours(&self, name: &str, dir: Direction) -> Vec<&Job> {
        let Some(&idx) = self.nodes.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<&Job> = self
            .graph
            .neighbors_directed(idx, dir)
            .filter_map(|n| self.jobs.get(&self.graph[n]))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// All edges as `(parent, child, condition)`, sorted.
    pub fn edges(&self) -> Vec<(JobName, JobName, EdgeInfo)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].clone(),
                    self.graph[e.target()].clone(),
                    *e.weight(),
                )
            })
            .collect();
        edges.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        edges
    }

    pub fn has_edge(&self, parent: &str, child: &str) -> bool {
        match (self.nodes.get(parent), self.nodes.get(child)) {
            (Some(&p), Some(&c)) => self.graph.find_edge(p, c).is_some(),
            _ => false,
        }
    }

    /// Whether `to` is reachable from `from`.
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        match (self.nodes.get(from), self.nodes.get(to)) {
            (Some(&a), Some(&b)) => has_path_connecting(&self.graph, a, b, None),
            _ => false,
        }
    }

    /// Remove `name` if it declares dependencies, ended up with no edge at
    /// all and its section allows deletion.
    pub fn prune_edgeless(&mut self, name: &str) -> bool {
        let Some(job) = self.jobs.get(name) else {
            return false;
        };
        let edgeless = !job.dependencies.is_empty()
            && job.parents.is_empty()
            && job.children.is_empty()
            && job.delete_when_edgeless;
        if edgeless {
            self.remove_node(name);
        }
        edgeless
    }

    pub fn prune_all_edgeless(&mut self) -> Vec<JobName> {
        let candidates: Vec<JobName> = self.jobs.keys().cloned().collect();
        let pruned: Vec<JobName> = candidates
            .into_iter()
            .filter(|name| self.prune_edgeless(name))
            .collect();
        if !pruned.is_empty() {
            info!(count = pruned.len(), "pruned edgeless jobs");
        }
        pruned
    }

    /// Remove every edge implied by a longer path of plain edges, then
    /// refresh the genealogy. Edges carrying a special condition never
    /// count as alternate paths, so a special edge only goes when plain
    /// edges already connect its endpoints.
    ///
    /// Returns the number of removed edges.
    pub fn transitive_reduction(&mut self) -> Result<usize> {
        let redundant = redundant_edges(&self.graph)?;
        let count = redundant.len();
        for edge in redundant {
            self.graph.remove_edge(edge);
        }
        self.rebuild_genealogy();
        debug!(removed = count, edges = self.graph.edge_count(), "transitive reduction");
        Ok(count)
    }

    /// Recompute `parents`, `children` and `edge_info` of every job from
    /// the adjacency.
    pub fn rebuild_genealogy(&mut self) {
        for job in self.jobs.values_mut() {
            job.parents.clear();
            job.children.clear();
            job.edge_info.clear();
        }
        for edge in self.graph.edge_references() {
            let parent = &self.graph[edge.source()];
            let child = &self.graph[edge.target()];
            let info = *edge.weight();
            if let Some(job) = self.jobs.get_mut(parent) {
                job.children.insert(child.clone());
            }
            if let Some(job) = self.jobs.get_mut(child) {
                job.parents.insert(parent.clone());
                if info != EdgeInfo::default() {
                    job.edge_info.insert(parent.clone(), info);
                }
            }
        }
    }

    pub fn jobs_by_status(&self, status: Status) -> Vec<&Job> {
        self.jobs.values().filter(|j| j.status == status).collect()
    }

    pub fn completed_jobs(&self) -> Vec<&Job> {
        self.jobs_by_status(Status::Completed)
    }

    pub fn failed_jobs(&self) -> Vec<&Job> {
        self.jobs_by_status(Status::Failed)
    }

    /// Every job is terminal and no failed job has retrials left.
    pub fn is_finished(&self) -> bool {
        self.jobs.values().all(|j| {
            j.status.is_done() || (j.status == Status::Failed && !j.retrials_left())
        })
    }

    fn index_of(&self, name: &str) -> Result<NodeIndex> {
        self.nodes
            .get(name)
            .copied()
            .ok_or_else(|| ExpflowError::JobNotFound(name.to_string()))
    }
}
