use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use expflow::engine::{ReadyJob, RuntimeEvent};
use expflow::errors::{ExpflowError, Result};
use expflow::exec::SubmissionBackend;
use expflow::job::{Job, JobName, Status};
use expflow::platform::Platform;

/// A platform that:
/// - records every cancel it is asked to send
/// - answers checkpoint queries from a settable table
/// - optionally rejects every cancel, or reports itself offline.
#[derive(Debug, Clone, Default)]
pub struct RecordingPlatform {
    cancels: Arc<Mutex<Vec<String>>>,
    checkpoints: Arc<Mutex<BTreeMap<JobName, u32>>>,
    reject_cancels: bool,
    offline: bool,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `send_cancel` returns an error.
    pub fn rejecting_cancels() -> Self {
        Self {
            reject_cancels: true,
            ..Self::default()
        }
    }

    /// `is_connected` returns false.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn set_checkpoint(&self, job: &str, step: u32) {
        self.checkpoints
            .lock()
            .unwrap()
            .insert(job.to_string(), step);
    }

    /// Remote ids cancels were sent for, in order.
    pub fn cancels(&self) -> Vec<String> {
        self.cancels.lock().unwrap().clone()
    }
}

impl Platform for RecordingPlatform {
    fn name(&self) -> &str {
        "recording"
    }

    fn is_connected(&self) -> bool {
        !self.offline
    }

    fn send_cancel(&self, remote_id: &str) -> Result<()> {
        self.cancels.lock().unwrap().push(remote_id.to_string());
        if self.reject_cancels {
            return Err(ExpflowError::Other(anyhow::anyhow!(
                "cancel of {remote_id} rejected"
            )));
        }
        Ok(())
    }

    fn checkpoint_step(&self, job: &Job) -> Result<Option<u32>> {
        Ok(self.checkpoints.lock().unwrap().get(&job.name).copied())
    }
}

/// A fake submission backend that:
/// - records which jobs were submitted, in order
/// - immediately reports QUEUING, RUNNING and COMPLETED (or FAILED for
///   names in `fail`) for each submitted job.
///
/// Reports are sent from a spawned task so a large batch never blocks the
/// runtime that awaits `submit`.
pub struct FakeBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    submitted: Arc<Mutex<Vec<ReadyJob>>>,
    fail: BTreeSet<JobName>,
    next_id: u64,
}

impl FakeBackend {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        submitted: Arc<Mutex<Vec<ReadyJob>>>,
    ) -> Self {
        Self {
            runtime_tx,
            submitted,
            fail: BTreeSet::new(),
            next_id: 0,
        }
    }

    pub fn failing(mut self, names: &[&str]) -> Self {
        self.fail.extend(names.iter().map(|n| n.to_string()));
        self
    }
}

impl SubmissionBackend for FakeBackend {
    fn submit(
        &mut self,
        jobs: Vec<ReadyJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let mut events = Vec::new();
        for job in jobs.iter() {
            self.next_id += 1;
            let remote_id = Some(format!("fake-{}", self.next_id));
            let last = if self.fail.contains(&job.name) {
                Status::Failed
            } else {
                Status::Completed
            };
            for status in [Status::Queuing, Status::Running, last] {
                events.push(RuntimeEvent::StatusReported {
                    job: job.name.clone(),
                    status,
                    remote_id: remote_id.clone(),
                });
            }
        }
        self.submitted.lock().unwrap().extend(jobs);

        let tx = self.runtime_tx.clone();
        Box::pin(async move {
            tokio::spawn(async move {
                for event in events {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            });
            Ok(())
        })
    }
}

/// A backend that only records submitted names; every status report is
/// left to the test.
#[derive(Debug, Clone, Default)]
pub struct SilentBackend {
    submitted: Arc<Mutex<Vec<JobName>>>,
}

impl SilentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<JobName> {
        self.submitted.lock().unwrap().clone()
    }
}

impl SubmissionBackend for SilentBackend {
    fn submit(
        &mut self,
        jobs: Vec<ReadyJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.submitted
            .lock()
            .unwrap()
            .extend(jobs.into_iter().map(|job| job.name));
        Box::pin(async { Ok(()) })
    }
}
