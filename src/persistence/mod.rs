// src/persistence/mod.rs

//! Snapshot persistence of the workflow graph.
//!
//! The core treats storage as an opaque snapshot/restore collaborator:
//!
//! - [`SnapshotStore`] loads and saves a whole [`Snapshot`].
//! - [`FileSnapshotStore`] writes JSON to disk and keeps the previous file
//!   as a `.bak` backup that loading falls back to.
//! - [`MemorySnapshotStore`] keeps the last snapshot in memory (tests,
//!   simulation).
//!
//! [`load_or_build`] and [`save_with_retry`] implement the recovery policy:
//! an unreadable store degrades to a full rebuild, a failed save is
//! retried once before surfacing as an error.

mod snapshot;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::ExperimentConfig;
use crate::dag::{BuildOutcome, WorkflowGraph, build_graph, rebuild_graph};
use crate::errors::{ExpflowError, Result};

pub use snapshot::{Snapshot, SnapshotEdge};

/// Abstract storage for graph snapshots.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Option<Snapshot>>;
    fn save(&mut self, snapshot: &Snapshot) -> Result<()>;
}

/// Stores the snapshot as JSON at `path`, keeping `<path>.bak`.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>> {
        let backup = self.backup_path();
        if !self.path.exists() && !backup.exists() {
            debug!(path = %self.path.display(), "no snapshot on disk");
            return Ok(None);
        }

        let primary_err = match read_snapshot(&self.path) {
            Ok(snapshot) => return Ok(Some(snapshot)),
            Err(err) => err,
        };
        warn!(
            path = %self.path.display(),
            error = %primary_err,
            "snapshot unreadable; trying backup"
        );

        match read_snapshot(&backup) {
            Ok(snapshot) => {
                info!(path = %backup.display(), "restored snapshot from backup");
                Ok(Some(snapshot))
            }
            Err(backup_err) => Err(ExpflowError::Persistence(format!(
                "snapshot {} unreadable ({primary_err}); backup {} unreadable ({backup_err})",
                self.path.display(),
                backup.display()
            ))),
        }
    }

    fn save(&mut self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if self.path.exists() {
            fs::copy(&self.path, self.backup_path())?;
        }

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), jobs = snapshot.jobs.len(), "stored snapshot (file)");
        Ok(())
    }
}

/// Keeps the last saved snapshot in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    snapshot: Option<Snapshot>,
    saves: usize,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            saves: 0,
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Number of successful saves.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>> {
        Ok(self.snapshot.clone())
    }

    fn save(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.snapshot = Some(snapshot.clone());
        self.saves += 1;
        Ok(())
    }
}

/// Restore the graph from `store` and bring it up to date with `config`,
/// or build it from scratch when there is nothing usable to restore.
pub fn load_or_build(
    store: &dyn SnapshotStore,
    config: &ExperimentConfig,
) -> Result<(WorkflowGraph, BuildOutcome)> {
    let snapshot = match store.load() {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(error = %err, "could not load snapshot; rebuilding from scratch");
            None
        }
    };

    let Some(snapshot) = snapshot else {
        return build_graph(config);
    };

    let mut graph = match WorkflowGraph::from_snapshot(&snapshot) {
        Ok(graph) => graph,
        Err(err) => {
            warn!(error = %err, "snapshot is inconsistent; rebuilding from scratch");
            return build_graph(config);
        }
    };
    info!(jobs = graph.len(), "restored workflow graph from snapshot");
    let outcome = rebuild_graph(&mut graph, &snapshot.config, config)?;
    Ok((graph, outcome))
}

/// Save, retrying once on failure.
pub fn save_with_retry(store: &mut dyn SnapshotStore, snapshot: &Snapshot) -> Result<()> {
    match store.save(snapshot) {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!(error = %first, "snapshot save failed; retrying once");
            store.save(snapshot).map_err(|second| {
                ExpflowError::Persistence(format!("saving snapshot failed twice: {second}"))
            })
        }
    }
}
