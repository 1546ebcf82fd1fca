// src/engine/event_handlers.rs

//! Event handling logic for the orchestration core.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::dag::WorkflowGraph;
use crate::engine::{ReadyJob, RuntimeOptions};
use crate::job::{JobName, Status};
use crate::platform::Platform;
use crate::status::{CancelRequest, CycleReport, StatusEngine};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Hand these jobs to the submission backend.
    Submit(Vec<ReadyJob>),
    /// Best-effort remote cancels; the outcome is ignored.
    Cancel(Vec<CancelRequest>),
    /// Some job changed; store a snapshot.
    Persist,
    /// Request that the process exits (no job can progress any more).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
    /// Report of the status cycle run for this event, if any.
    pub report: Option<CycleReport>,
}

impl CoreStep {
    pub fn stop() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: false,
            report: None,
        }
    }
}

/// Apply a status reported by the platform. Unknown jobs are ignored.
///
/// Returns whether the job changed.
pub fn apply_status_report(
    graph: &mut WorkflowGraph,
    job: &str,
    status: Status,
    remote_id: Option<String>,
) -> bool {
    let Some(target) = graph.get_mut(job) else {
        warn!(job = %job, status = %status, "status report for unknown job ignored");
        return false;
    };
    let mut changed = false;
    if remote_id.is_some() && target.remote_id != remote_id {
        target.remote_id = remote_id;
        changed = true;
    }
    if target.status != status {
        debug!(job = %job, from = %target.status, to = %status, "status reported");
        target.status = status;
        changed = true;
    }
    changed
}

/// Record a checkpoint step written by a running job.
pub fn apply_checkpoint_report(graph: &mut WorkflowGraph, job: &str, step: u32) -> bool {
    let Some(target) = graph.get_mut(job) else {
        warn!(job = %job, step, "checkpoint report for unknown job ignored");
        return false;
    };
    if step > target.checkpoint_step {
        target.checkpoint_step = step;
        return true;
    }
    false
}

/// Run one status cycle and turn its outcome into commands.
///
/// READY jobs are moved to SUBMITTED as they are handed out, so a job is
/// never submitted twice.
pub fn handle_cycle(
    graph: &mut WorkflowGraph,
    engine: &StatusEngine,
    platform: &dyn Platform,
    options: &RuntimeOptions,
    reported: &mut BTreeSet<JobName>,
    dirty: bool,
    now: DateTime<Utc>,
) -> CoreStep {
    let report = engine.run_cycle(graph, platform, now);
    let mut commands = Vec::new();

    for name in report.exhausted.iter() {
        if reported.insert(name.clone()) {
            warn!(job = %name, "job failed with no retrials left");
        }
    }

    if !report.cancel_requests.is_empty() {
        commands.push(CoreCommand::Cancel(report.cancel_requests.clone()));
    }

    let ready: Vec<JobName> = graph
        .jobs_by_status(Status::Ready)
        .into_iter()
        .map(|job| job.name.clone())
        .collect();
    let mut submit = Vec::with_capacity(ready.len());
    for name in ready {
        if let Some(job) = graph.get_mut(&name) {
            submit.push(ReadyJob::from_job(job));
            job.status = Status::Submitted;
        }
    }
    let submitted = !submit.is_empty();
    if submitted {
        info!(count = submit.len(), "submitting ready jobs");
        commands.push(CoreCommand::Submit(submit));
    }

    if dirty || report.save || submitted {
        commands.push(CoreCommand::Persist);
    }

    let mut keep_running = true;
    if options.exit_when_idle && is_idle(graph) {
        info!(
            completed = graph.completed_jobs().len(),
            failed = graph.failed_jobs().len(),
            "no job can make progress; requesting exit"
        );
        commands.push(CoreCommand::RequestExit);
        keep_running = false;
    }

    CoreStep {
        commands,
        keep_running,
        report: Some(report),
    }
}

/// Nothing is in flight, nothing is about to start and no failed job
/// will be retried.
///
/// Only meaningful right after a status cycle: a PREPARED job left over
/// by the cycle still has unfinished parents, so it cannot move on its own.
pub fn is_idle(graph: &WorkflowGraph) -> bool {
    graph.jobs().all(|job| {
        !job.status.is_active()
            && !matches!(job.status, Status::Ready | Status::Delayed)
            && !(job.status == Status::Failed && job.retrials_left())
    })
}
