// src/engine/core.rs

//! Pure orchestration core.
//!
//! The [`Orchestrator`] consumes [`RuntimeEvent`]s and produces:
//! - an updated graph and job states
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for reading
//! events from the channel, submitting jobs, sending cancels and storing
//! snapshots. The core holds no channels and performs no file or network
//! IO; the platform handle is only asked for checkpoint steps.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::ExperimentConfig;
use crate::dag::WorkflowGraph;
use crate::engine::event_handlers::{
    CoreStep, apply_checkpoint_report, apply_status_report, handle_cycle,
};
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::job::JobName;
use crate::persistence::Snapshot;
use crate::platform::Platform;
use crate::status::{EngineOptions, StatusEngine};

/// Owns one experiment's graph and the state machine driving it.
pub struct Orchestrator {
    config: ExperimentConfig,
    graph: WorkflowGraph,
    engine: StatusEngine,
    platform: Arc<dyn Platform>,
    options: RuntimeOptions,
    /// Exhausted jobs already reported.
    reported: BTreeSet<JobName>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("expid", &self.config.expid())
            .field("jobs", &self.graph.len())
            .field("platform", &self.platform.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Jobs of wrapped sections are marked as packed.
    pub fn new(
        config: ExperimentConfig,
        mut graph: WorkflowGraph,
        platform: Arc<dyn Platform>,
        options: RuntimeOptions,
    ) -> Self {
        let wrapped: BTreeSet<&String> = config
            .wrappers
            .values()
            .flat_map(|w| w.jobs.iter())
            .collect();
        for section in wrapped {
            let names: Vec<JobName> = graph
                .section_jobs(section)
                .iter()
                .map(|job| job.name.clone())
                .collect();
            for name in names {
                if let Some(job) = graph.get_mut(&name) {
                    job.packed = true;
                }
            }
        }

        let engine = StatusEngine::new(EngineOptions::from_config(&config));
        Self {
            config,
            graph,
            engine,
            platform,
            options,
            reported: BTreeSet::new(),
        }
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn platform(&self) -> Arc<dyn Platform> {
        Arc::clone(&self.platform)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.graph.to_snapshot(&self.config)
    }

    /// Handle a single runtime event at time `now`.
    ///
    /// Every event except shutdown is followed by a status cycle.
    pub fn step(&mut self, event: RuntimeEvent, now: DateTime<Utc>) -> CoreStep {
        let dirty = match event {
            RuntimeEvent::CycleRequested => false,
            RuntimeEvent::StatusReported {
                job,
                status,
                remote_id,
            } => apply_status_report(&mut self.graph, &job, status, remote_id),
            RuntimeEvent::CheckpointReported { job, step } => {
                apply_checkpoint_report(&mut self.graph, &job, step)
            }
            RuntimeEvent::ShutdownRequested => return CoreStep::stop(),
        };

        handle_cycle(
            &mut self.graph,
            &self.engine,
            self.platform.as_ref(),
            &self.options,
            &mut self.reported,
            dirty,
            now,
        )
    }
}
