// src/job/instance.rs

//! Concrete job instances and their coordinates.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::status::Status;
use crate::types::{RetryDelay, RunningType, Synchronize};

/// Canonical job name type used throughout the crate.
pub type JobName = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum DatePrecision {
    Day,
    Hour,
    Minute,
}

/// A start date of the experiment.
///
/// Parsed from `YYYYMMDD`, `YYYYMMDDHH` or `YYYYMMDDHHMM` and rendered back
/// with the same precision, which is what appears in job names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StartDate {
    value: NaiveDateTime,
    precision: DatePrecision,
}

impl StartDate {
    pub fn datetime(&self) -> NaiveDateTime {
        self.value
    }
}

impl FromStr for StartDate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || format!("invalid start date: {s:?} (expected YYYYMMDD[HH[MM]])");

        if !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let (day, rest) = match s.len() {
            8 | 10 | 12 => s.split_at(8),
            _ => return Err(invalid()),
        };
        let date = NaiveDate::parse_from_str(day, "%Y%m%d").map_err(|_| invalid())?;

        let (hour, minute, precision) = match rest.len() {
            0 => (0, 0, DatePrecision::Day),
            2 => (rest.parse().map_err(|_| invalid())?, 0, DatePrecision::Hour),
            _ => (
                rest[..2].parse().map_err(|_| invalid())?,
                rest[2..].parse().map_err(|_| invalid())?,
                DatePrecision::Minute,
            ),
        };

        let value = date.and_hms_opt(hour, minute, 0).ok_or_else(invalid)?;
        Ok(StartDate { value, precision })
    }
}

impl fmt::Display for StartDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pattern = match self.precision {
            DatePrecision::Day => "%Y%m%d",
            DatePrecision::Hour => "%Y%m%d%H",
            DatePrecision::Minute => "%Y%m%d%H%M",
        };
        write!(f, "{}", self.value.format(pattern))
    }
}

impl TryFrom<String> for StartDate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StartDate> for String {
    fn from(value: StartDate) -> Self {
        value.to_string()
    }
}

/// Position of a job instance on the four axes.
///
/// `None` means the instance does not vary along that axis (e.g. a
/// `once` section has no date, a member-synchronized chunk section has no
/// member).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinates {
    pub date: Option<StartDate>,
    pub member: Option<String>,
    pub chunk: Option<u32>,
    pub split: Option<u32>,
}

/// Composite lookup key: section plus coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub section: String,
    pub coords: Coordinates,
}

impl JobKey {
    /// Deterministic job name:
    /// `expid[_date][_member][_chunk][_split]_section`.
    pub fn job_name(&self, expid: &str) -> JobName {
        let mut name = expid.to_string();
        if let Some(date) = &self.coords.date {
            name.push('_');
            name.push_str(&date.to_string());
        }
        if let Some(member) = &self.coords.member {
            name.push('_');
            name.push_str(member);
        }
        if let Some(chunk) = self.coords.chunk {
            name.push_str(&format!("_{chunk}"));
        }
        if let Some(split) = self.coords.split {
            name.push_str(&format!("_{split}"));
        }
        name.push('_');
        name.push_str(&self.section);
        name
    }
}

/// Condition attached to a parent→child edge.
///
/// The default (`Completed`, step 0, required) is a plain edge; anything
/// else is a *special* edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeInfo {
    /// Status the parent must reach before the child may start.
    pub status: Status,
    /// Minimum checkpoint step the parent must report.
    pub from_step: u32,
    /// Weak edge: a FAILED parent does not block the child.
    pub optional: bool,
}

impl Default for EdgeInfo {
    fn default() -> Self {
        Self {
            status: Status::Completed,
            from_step: 0,
            optional: false,
        }
    }
}

impl EdgeInfo {
    /// Special edges gate on something other than plain completion.
    pub fn is_special(&self) -> bool {
        self.status != Status::Completed || self.from_step > 0
    }

    /// Merge two conditions wired between the same pair of jobs. A required
    /// edge wins over an optional one; the stricter step wins.
    pub fn merge(self, other: EdgeInfo) -> EdgeInfo {
        let status = if self.status == Status::Completed || other.status == Status::Completed {
            Status::Completed
        } else if self.status.logical_rank() >= other.status.logical_rank() {
            self.status
        } else {
            other.status
        };
        EdgeInfo {
            status,
            from_step: self.from_step.max(other.from_step),
            optional: self.optional && other.optional,
        }
    }
}

/// A concrete unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: JobName,
    pub section: String,
    pub running: RunningType,
    pub date: Option<StartDate>,
    pub member: Option<String>,
    pub chunk: Option<u32>,
    pub split: Option<u32>,
    /// Number of splits of the section (0 when unsplit).
    pub splits: u32,
    pub status: Status,
    /// Creation order within the graph build.
    pub priority: u32,
    pub fail_count: u32,
    pub retrials: u32,
    pub delay_retry: RetryDelay,
    pub delay_end: Option<DateTime<Utc>>,
    /// Last checkpoint step reported by the platform.
    pub checkpoint_step: u32,
    /// Highest `FROM_STEP` any child waits for.
    pub max_checkpoint_step: u32,
    pub hold: bool,
    pub packed: bool,
    pub frequency: u32,
    pub synchronize: Option<Synchronize>,
    /// Dependency keys of the section, shared by all its instances.
    pub dependencies: Vec<String>,
    pub skippable: bool,
    pub delete_when_edgeless: bool,
    /// Identifier on the remote platform once submitted.
    pub remote_id: Option<String>,
    pub parents: BTreeSet<JobName>,
    pub children: BTreeSet<JobName>,
    /// Non-default edge conditions keyed by parent name.
    pub edge_info: BTreeMap<JobName, EdgeInfo>,
}

impl Job {
    pub fn new(name: JobName, key: &JobKey, running: RunningType) -> Self {
        Self {
            name,
            section: key.section.clone(),
            running,
            date: key.coords.date,
            member: key.coords.member.clone(),
            chunk: key.coords.chunk,
            split: key.coords.split,
            splits: 0,
            status: Status::Waiting,
            priority: 0,
            fail_count: 0,
            retrials: 0,
            delay_retry: RetryDelay::default(),
            delay_end: None,
            checkpoint_step: 0,
            max_checkpoint_step: 0,
            hold: false,
            packed: false,
            frequency: 1,
            synchronize: None,
            dependencies: Vec::new(),
            skippable: false,
            delete_when_edgeless: true,
            remote_id: None,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            edge_info: BTreeMap::new(),
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            date: self.date,
            member: self.member.clone(),
            chunk: self.chunk,
            split: self.split,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey {
            section: self.section.clone(),
            coords: self.coordinates(),
        }
    }

    /// Condition on the edge from `parent`, defaulting to a plain edge.
    pub fn edge_to(&self, parent: &str) -> EdgeInfo {
        self.edge_info.get(parent).copied().unwrap_or_default()
    }

    pub fn has_special_edges(&self) -> bool {
        self.edge_info.values().any(EdgeInfo::is_special)
    }

    pub fn retrials_left(&self) -> bool {
        self.fail_count < self.retrials
    }
}
