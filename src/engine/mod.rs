// src/engine/mod.rs

//! Orchestration engine for expflow.
//!
//! This module ties together:
//! - the workflow graph and the status state machine
//! - the main runtime event loop that reacts to:
//!   - periodic cycle requests
//!   - status and checkpoint reports from the submission backend
//!   - shutdown signals
//!
//! The pure core lives in [`core`]; the async/IO shell is implemented in
//! [`runtime`]. One runtime owns one experiment, and its single event
//! queue serializes every mutation of that experiment's graph.

use std::time::Duration;

use crate::job::{Job, JobName, Status};

/// A READY job handed to the submission backend.
///
/// Held (PREPARED) jobs stay in the graph until their hold is released
/// and they turn READY, so nothing handed out is ever held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyJob {
    pub name: JobName,
    pub section: String,
    /// Belongs to a wrapped section.
    pub packed: bool,
    /// Highest checkpoint step any child waits for.
    pub max_checkpoint_step: u32,
}

impl ReadyJob {
    pub fn from_job(job: &Job) -> Self {
        Self {
            name: job.name.clone(),
            section: job.section.clone(),
            packed: job.packed,
            max_checkpoint_step: job.max_checkpoint_step,
        }
    }
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Exit once no job can make progress any more (simulation, tests).
    pub exit_when_idle: bool,
    /// Period of the cycle ticker.
    pub cycle_interval: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            exit_when_idle: false,
            cycle_interval: Duration::from_secs(10),
        }
    }
}

/// Events flowing into the runtime from the ticker, backends, etc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// Run one status cycle.
    CycleRequested,
    /// The platform reported a new status for a job.
    StatusReported {
        job: JobName,
        status: Status,
        remote_id: Option<String>,
    },
    /// A running job wrote a checkpoint.
    CheckpointReported { job: JobName, step: u32 },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::Orchestrator;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::{RunSummary, Runtime, spawn_cycle_ticker};
