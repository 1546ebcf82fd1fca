// src/exec/simulator.rs

//! Simulated remote platform.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::{ReadyJob, RuntimeEvent};
use crate::job::{JobName, Status};

/// Spawn the background simulator loop.
///
/// Every submitted job gets a remote id `sim-N` and runs in its own Tokio
/// task, which reports QUEUING, RUNNING, one checkpoint per step up to the
/// job's `max_checkpoint_step`, and finally COMPLETED (or FAILED for names
/// in `fail`).
pub fn spawn_simulator(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    fail: BTreeSet<JobName>,
    step_delay: Duration,
) -> mpsc::Sender<ReadyJob> {
    let (tx, mut rx) = mpsc::channel::<ReadyJob>(64);
    let fail = Arc::new(fail);

    tokio::spawn(async move {
        info!("simulator loop started");
        let mut next_id: u64 = 0;

        while let Some(job) = rx.recv().await {
            next_id += 1;
            let remote_id = format!("sim-{next_id}");
            debug!(job = %job.name, remote_id = %remote_id, "simulating job");
            let runtime_tx = runtime_tx.clone();
            let fails = fail.contains(&job.name);
            tokio::spawn(simulate_job(job, remote_id, fails, runtime_tx, step_delay));
        }

        info!("simulator loop finished (channel closed)");
    });

    tx
}

async fn simulate_job(
    job: ReadyJob,
    remote_id: String,
    fails: bool,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    step_delay: Duration,
) {
    let mut events = vec![
        RuntimeEvent::StatusReported {
            job: job.name.clone(),
            status: Status::Queuing,
            remote_id: Some(remote_id.clone()),
        },
        RuntimeEvent::StatusReported {
            job: job.name.clone(),
            status: Status::Running,
            remote_id: Some(remote_id.clone()),
        },
    ];
    if !fails {
        events.extend((1..=job.max_checkpoint_step).map(|step| {
            RuntimeEvent::CheckpointReported {
                job: job.name.clone(),
                step,
            }
        }));
    }
    events.push(RuntimeEvent::StatusReported {
        job: job.name.clone(),
        status: if fails { Status::Failed } else { Status::Completed },
        remote_id: Some(remote_id),
    });

    for event in events {
        if !step_delay.is_zero() {
            tokio::time::sleep(step_delay).await;
        }
        if runtime_tx.send(event).await.is_err() {
            debug!(job = %job.name, "runtime gone; abandoning simulated job");
            return;
        }
    }
}
