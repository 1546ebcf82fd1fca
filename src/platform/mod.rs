// src/platform/mod.rs

//! Remote platform collaborator.
//!
//! The core only needs three things from a platform: whether it is
//! reachable, a best-effort cancel, and the latest checkpoint step of a
//! running job. Transport (SSH, scheduler commands) lives behind this
//! trait; implementations must return promptly or time out.

use crate::errors::Result;
use crate::job::Job;

pub trait Platform: Send + Sync {
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Ask the remote scheduler to cancel `remote_id`.
    fn send_cancel(&self, remote_id: &str) -> Result<()>;

    /// Latest checkpoint step reached by a running job, if any was
    /// written.
    fn checkpoint_step(&self, job: &Job) -> Result<Option<u32>>;
}

/// Platform used when no transport is configured: never connected, every
/// call is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedPlatform;

impl Platform for DisconnectedPlatform {
    fn name(&self) -> &str {
        "disconnected"
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn send_cancel(&self, _remote_id: &str) -> Result<()> {
        Ok(())
    }

    fn checkpoint_step(&self, _job: &Job) -> Result<Option<u32>> {
        Ok(None)
    }
}
