// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::{CoreCommand, Orchestrator, ReadyJob, RuntimeEvent};
use crate::errors::Result;
use crate::exec::SubmissionBackend;
use crate::job::{JobName, Status};
use crate::persistence::{SnapshotStore, save_with_retry};
use crate::platform::Platform;
use crate::status::CancelRequest;

/// Final job states when the runtime stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: Vec<JobName>,
    pub failed: Vec<JobName>,
    pub skipped: Vec<JobName>,
    /// Jobs that never reached a terminal state.
    pub pending: Vec<JobName>,
}

/// Async IO shell around [`Orchestrator`].
///
/// Reads events from a single queue, feeds them to the core and executes
/// the returned commands: submissions go to the backend, cancels to the
/// platform (off the event loop, outcome ignored), snapshots to the store.
pub struct Runtime<B: SubmissionBackend> {
    core: Orchestrator,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    backend: B,
    store: Box<dyn SnapshotStore>,
}

impl<B: SubmissionBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<B: SubmissionBackend> Runtime<B> {
    pub fn new(
        core: Orchestrator,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        backend: B,
        store: Box<dyn SnapshotStore>,
    ) -> Self {
        Self {
            core,
            event_rx,
            backend,
            store,
        }
    }

    /// Main event loop.
    pub async fn run(mut self) -> Result<RunSummary> {
        info!(expid = %self.core.config().expid(), "expflow runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");
            let step = self.core.step(event, Utc::now());

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        let summary = self.summary();
        info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            pending = summary.pending.len(),
            "runtime exiting"
        );
        Ok(summary)
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Submit(jobs) => self.submit(jobs).await?,
            CoreCommand::Cancel(requests) => self.cancel(requests),
            CoreCommand::Persist => {
                let snapshot = self.core.snapshot();
                save_with_retry(self.store.as_mut(), &snapshot)?;
            }
            CoreCommand::RequestExit => {
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn submit(&mut self, jobs: Vec<ReadyJob>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }
        let names: Vec<_> = jobs.iter().map(|j| j.name.as_str()).collect();
        debug!(?names, "submitting jobs");
        self.backend.submit(jobs).await
    }

    fn cancel(&self, requests: Vec<CancelRequest>) {
        let platform: Arc<dyn Platform> = self.core.platform();
        tokio::task::spawn_blocking(move || {
            if !platform.is_connected() {
                debug!(
                    platform = platform.name(),
                    count = requests.len(),
                    "platform not connected; dropping remote cancels"
                );
                return;
            }
            for request in requests {
                if let Err(err) = platform.send_cancel(&request.remote_id) {
                    debug!(
                        job = %request.job,
                        remote_id = %request.remote_id,
                        error = %err,
                        "remote cancel failed; ignoring"
                    );
                }
            }
        });
    }

    fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for job in self.core.graph().jobs() {
            let bucket = match job.status {
                Status::Completed => &mut summary.completed,
                Status::Failed => &mut summary.failed,
                Status::Skipped => &mut summary.skipped,
                _ => &mut summary.pending,
            };
            bucket.push(job.name.clone());
        }
        summary
    }
}

/// Send `CycleRequested` every `interval` until the runtime goes away.
pub fn spawn_cycle_ticker(tx: mpsc::Sender<RuntimeEvent>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if tx.send(RuntimeEvent::CycleRequested).await.is_err() {
                debug!("cycle ticker stopping (runtime gone)");
                break;
            }
        }
    })
}
