// src/status/engine.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ExperimentConfig;
use crate::dag::WorkflowGraph;
use crate::job::{EdgeInfo, Job, JobName, Status};
use crate::platform::Platform;
use crate::status::retry::{RetryDecision, plan_retry};
use crate::status::skip::superseded_jobs;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Stage jobs as PREPARED + held once all parents are queued.
    pub remote_dependencies: bool,
}

impl EngineOptions {
    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self {
            remote_dependencies: config.config.remote_dependencies,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub job: JobName,
    pub from: Status,
    pub to: Status,
}

/// Best-effort remote cancel for a skipped job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelRequest {
    pub job: JobName,
    pub remote_id: String,
}

/// Everything one cycle changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Some job changed; the caller should persist.
    pub save: bool,
    pub transitions: Vec<Transition>,
    /// FAILED jobs without retrials left.
    pub exhausted: Vec<JobName>,
    pub cancel_requests: Vec<CancelRequest>,
}

impl CycleReport {
    fn record(&mut self, job: &mut Job, to: Status) {
        if job.status == to {
            return;
        }
        debug!(job = %job.name, from = %job.status, to = %to, "status change");
        self.transitions.push(Transition {
            job: job.name.clone(),
            from: job.status,
            to,
        });
        job.status = to;
        self.save = true;
    }
}

/// Per-cycle status state machine.
///
/// The rules run in a fixed order:
/// 1. FAILED retrial
/// 2. checkpoint re-activation of special edges
/// 3. synchronized completion check
/// 4. DELAYED -> READY
/// 5. WAITING -> READY
/// 6. skip policy
/// 7. remote-dependency staging (when enabled)
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusEngine {
    options: EngineOptions,
}

impl StatusEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn run_cycle(
        &self,
        graph: &mut WorkflowGraph,
        platform: &dyn Platform,
        now: DateTime<Utc>,
    ) -> CycleReport {
        let mut report = CycleReport::default();

        self.retry_failed(graph, now, &mut report);
        self.reactivate_on_checkpoints(graph, platform, &mut report);
        self.check_synchronized(graph, &mut report);
        self.release_delayed(graph, now, &mut report);
        self.activate_waiting(graph, &mut report);
        self.apply_skip_policy(graph, &mut report);
        if self.options.remote_dependencies {
            self.stage_remote_dependencies(graph, &mut report);
        }

        if report.save {
            info!(
                transitions = report.transitions.len(),
                exhausted = report.exhausted.len(),
                cancels = report.cancel_requests.len(),
                "status cycle"
            );
        }
        report
    }

    pub fn retry_failed(&self, graph: &mut WorkflowGraph, now: DateTime<Utc>, report: &mut CycleReport) {
        for name in names_with_status(graph, &[Status::Failed]) {
            let parents_done = all_parents(graph, &name, |p, _| p.status.is_done());
            let Some(job) = graph.get_mut(&name) else {
                continue;
            };
            match plan_retry(job, parents_done, now) {
                RetryDecision::Exhausted => report.exhausted.push(name),
                RetryDecision::Wait => {
                    report.save = true;
                    report.record(job, Status::Waiting);
                }
                RetryDecision::Ready => {
                    report.save = true;
                    report.record(job, Status::Ready);
                }
                RetryDecision::Delay { until } => {
                    debug!(job = %name, until = %until, fail_count = job.fail_count, "delaying retrial");
                    job.delay_end = Some(until);
                    report.save = true;
                    report.record(job, Status::Delayed);
                }
            }
        }
    }

    /// Refresh checkpoint steps of running parents, then start WAITING
    /// jobs whose special edge conditions are all met.
    pub fn reactivate_on_checkpoints(
        &self,
        graph: &mut WorkflowGraph,
        platform: &dyn Platform,
        report: &mut CycleReport,
    ) {
        let waiting: Vec<JobName> = graph
            .jobs()
            .filter(|j| j.status == Status::Waiting && j.has_special_edges())
            .map(|j| j.name.clone())
            .collect();
        if waiting.is_empty() {
            return;
        }

        let running_parents: Vec<JobName> = graph
            .jobs()
            .filter(|j| j.status == Status::Running && j.max_checkpoint_step > 0)
            .map(|j| j.name.clone())
            .collect();
        for name in running_parents {
            let Some(job) = graph.get_mut(&name) else {
                continue;
            };
            match platform.checkpoint_step(job) {
                Ok(Some(step)) if step > job.checkpoint_step => {
                    debug!(job = %name, step, "checkpoint advanced");
                    job.checkpoint_step = step;
                    report.save = true;
                }
                Ok(_) => {}
                Err(err) => {
                    debug!(job = %name, platform = platform.name(), error = %err, "checkpoint query failed");
                }
            }
        }

        for name in waiting {
            let eligible = all_parents(graph, &name, |parent, edge| {
                parent.status == Status::Completed
                    || (parent.status.has_reached(edge.status)
                        && parent.checkpoint_step >= edge.from_step)
            });
            if !eligible {
                continue;
            }

            let edges: Vec<(JobName, EdgeInfo)> = graph
                .get(&name)
                .map(|j| j.edge_info.iter().map(|(p, e)| (p.clone(), *e)).collect())
                .unwrap_or_default();
            for (parent, edge) in edges {
                if let Some(p) = graph.get_mut(&parent) {
                    p.max_checkpoint_step = p.max_checkpoint_step.max(edge.from_step);
                }
            }
            if let Some(job) = graph.get_mut(&name) {
                job.remote_id = None;
                report.record(job, Status::Ready);
            }
        }
    }

    pub fn check_synchronized(&self, graph: &mut WorkflowGraph, report: &mut CycleReport) {
        let candidates: Vec<JobName> = graph
            .jobs()
            .filter(|j| j.status == Status::Completed && j.synchronize.is_some())
            .map(|j| j.name.clone())
            .collect();
        for name in candidates {
            if all_parents(graph, &name, |p, _| p.status.is_done()) {
                continue;
            }
            if let Some(job) = graph.get_mut(&name) {
                warn!(job = %name, "synchronized job lost a completed parent; back to WAITING");
                report.record(job, Status::Waiting);
            }
        }
    }

    pub fn release_delayed(&self, graph: &mut WorkflowGraph, now: DateTime<Utc>, report: &mut CycleReport) {
        for name in names_with_status(graph, &[Status::Delayed]) {
            let Some(job) = graph.get_mut(&name) else {
                continue;
            };
            if job.delay_end.is_none_or(|end| now >= end) {
                job.delay_end = None;
                report.record(job, Status::Ready);
            }
        }
    }

    /// WAITING -> READY once every parent is done. FAILED parents only
    /// block when bound through a required edge.
    pub fn activate_waiting(&self, graph: &mut WorkflowGraph, report: &mut CycleReport) {
        for name in names_with_status(graph, &[Status::Waiting]) {
            let ready = all_parents(graph, &name, |parent, edge| {
                parent.status.is_done() || (parent.status == Status::Failed && edge.optional)
            });
            if !ready {
                continue;
            }
            if let Some(job) = graph.get_mut(&name) {
                report.record(job, Status::Ready);
            }
        }
    }

    pub fn apply_skip_policy(&self, graph: &mut WorkflowGraph, report: &mut CycleReport) {
        for decision in superseded_jobs(graph) {
            let Some(job) = graph.get_mut(&decision.job) else {
                continue;
            };
            info!(job = %decision.job, "skipping superseded job");
            report.record(job, Status::Skipped);
            if let Some(remote_id) = decision.remote_id {
                report.cancel_requests.push(CancelRequest {
                    job: decision.job,
                    remote_id,
                });
            }
        }
    }

    /// WAITING jobs whose parents are all queued or further become
    /// PREPARED and held; held jobs are released once every parent is
    /// done.
    pub fn stage_remote_dependencies(&self, graph: &mut WorkflowGraph, report: &mut CycleReport) {
        for name in names_with_status(graph, &[Status::Waiting]) {
            let has_parents = graph.get(&name).is_some_and(|j| !j.parents.is_empty());
            let staged = has_parents
                && all_parents(graph, &name, |p, _| {
                    matches!(p.status, Status::Queuing | Status::Running) || p.status.is_done()
                });
            if !staged {
                continue;
            }
            if let Some(job) = graph.get_mut(&name) {
                job.hold = true;
                report.record(job, Status::Prepared);
            }
        }

        let held: Vec<JobName> = graph
            .jobs()
            .filter(|j| j.hold)
            .map(|j| j.name.clone())
            .collect();
        for name in held {
            if !all_parents(graph, &name, |p, _| p.status.is_done()) {
                continue;
            }
            if let Some(job) = graph.get_mut(&name) {
                debug!(job = %name, "releasing hold");
                job.hold = false;
                report.save = true;
                if job.status == Status::Prepared {
                    report.record(job, Status::Ready);
                }
            }
        }
    }
}

fn names_with_status(graph: &WorkflowGraph, statuses: &[Status]) -> Vec<JobName> {
    graph
        .jobs()
        .filter(|j| statuses.contains(&j.status))
        .map(|j| j.name.clone())
        .collect()
}

/// Whether `check(parent, edge)` holds for every parent of `name`.
fn all_parents(
    graph: &WorkflowGraph,
    name: &str,
    check: impl Fn(&Job, &EdgeInfo) -> bool,
) -> bool {
    let Some(job) = graph.get(name) else {
        return false;
    };
    job.parents.iter().all(|parent| match graph.get(parent) {
        Some(p) => check(p, &job.edge_to(parent)),
        None => true,
    })
}
