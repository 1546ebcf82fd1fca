// src/job/status.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Run-time status of a job instance.
///
/// `Waiting` is the only creation state. `Completed`, `Failed` and
/// `Skipped` are terminal for a given attempt, although `Failed` may loop
/// back through retrial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Waiting,
    Ready,
    Queuing,
    Submitted,
    Running,
    Held,
    Prepared,
    Delayed,
    Completed,
    Failed,
    Skipped,
    Suspended,
    Unknown,
}

impl Status {
    pub const ALL: [Status; 13] = [
        Status::Waiting,
        Status::Ready,
        Status::Queuing,
        Status::Submitted,
        Status::Running,
        Status::Held,
        Status::Prepared,
        Status::Delayed,
        Status::Completed,
        Status::Failed,
        Status::Skipped,
        Status::Suspended,
        Status::Unknown,
    ];

    /// Position in the logical progression of a job.
    ///
    /// A parent "reaches" a required status when its rank is at least the
    /// rank of the required status; `Completed` ranks highest.
    pub fn logical_rank(self) -> u8 {
        match self {
            Status::Unknown => 0,
            Status::Waiting => 1,
            Status::Delayed => 2,
            Status::Prepared => 3,
            Status::Ready => 4,
            Status::Submitted => 5,
            Status::Held | Status::Suspended => 6,
            Status::Queuing => 7,
            Status::Running => 8,
            Status::Skipped => 9,
            Status::Failed => 10,
            Status::Completed => 11,
        }
    }

    pub fn has_reached(self, required: Status) -> bool {
        self.logical_rank() >= required.logical_rank()
    }

    /// States that a rebuild resets back to `Waiting`.
    pub fn is_pre_run(self) -> bool {
        matches!(
            self,
            Status::Waiting | Status::Delayed | Status::Prepared | Status::Ready
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Skipped)
    }

    /// Completed or skipped: treated as satisfied by dependents.
    pub fn is_done(self) -> bool {
        matches!(self, Status::Completed | Status::Skipped)
    }

    /// States in which the job is known to the remote platform.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Status::Submitted | Status::Queuing | Status::Running | Status::Held
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Waiting => "WAITING",
            Status::Ready => "READY",
            Status::Queuing => "QUEUING",
            Status::Submitted => "SUBMITTED",
            Status::Running => "RUNNING",
            Status::Held => "HELD",
            Status::Prepared => "PREPARED",
            Status::Delayed => "DELAYED",
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
            Status::Skipped => "SKIPPED",
            Status::Suspended => "SUSPENDED",
            Status::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Status::ALL
            .into_iter()
            .find(|status| status.to_string() == upper)
            .ok_or_else(|| format!("invalid status: {s}"))
    }
}
