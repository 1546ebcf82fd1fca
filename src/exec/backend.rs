// src/exec/backend.rs

//! Pluggable submission backend abstraction.
//!
//! The runtime talks to a `SubmissionBackend` instead of a concrete remote
//! scheduler. This makes it easy to swap in a fake backend in tests while
//! keeping the simulated backend used by `expflow simulate`.
//!
//! - `SimulatedBackend` wraps the [`spawn_simulator`] loop and just forwards
//!   submitted jobs over an mpsc channel.
//! - Tests can provide their own `SubmissionBackend` that, for example,
//!   records which jobs were submitted and directly emits `StatusReported`
//!   events.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::engine::{ReadyJob, RuntimeEvent};
use crate::errors::{Error, Result};
use crate::job::JobName;

use super::simulator::spawn_simulator;

/// Trait abstracting how READY jobs reach a platform.
pub trait SubmissionBackend: Send {
    /// Submit the given jobs.
    ///
    /// The implementation reports progress back as `RuntimeEvent`s; it must
    /// not touch the graph.
    fn submit(
        &mut self,
        jobs: Vec<ReadyJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Backend that pretends to run every job on a remote platform.
pub struct SimulatedBackend {
    tx: mpsc::Sender<ReadyJob>,
}

impl SimulatedBackend {
    /// Spawns the background simulator immediately. Jobs named in `fail`
    /// fail on every attempt; each reported step takes `step_delay`.
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        fail: BTreeSet<JobName>,
        step_delay: Duration,
    ) -> Self {
        let tx = spawn_simulator(runtime_tx, fail, step_delay);
        Self { tx }
    }
}

impl SubmissionBackend for SimulatedBackend {
    fn submit(
        &mut self,
        jobs: Vec<ReadyJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for job in jobs {
                tx.send(job).await.map_err(Error::from)?;
            }
            Ok(())
        })
    }
}
