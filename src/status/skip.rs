// src/status/skip.rs

//! Skip policy for superseded chunk and member jobs.

use std::collections::BTreeMap;

use crate::dag::WorkflowGraph;
use crate::job::{JobName, StartDate, Status};
use crate::types::RunningType;

/// A job superseded by a later sibling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipDecision {
    pub job: JobName,
    /// Set when the job is already queued remotely.
    pub remote_id: Option<String>,
}

type SkipGroup = (String, Option<StartDate>, Option<String>, Option<u32>);

/// Earlier READY/QUEUING siblings of the latest READY/QUEUING job of each
/// skip group.
///
/// Chunk sections group by (section, date, member, split) and order by
/// chunk; member sections group by (section, date, split) and order by
/// member position.
pub fn superseded_jobs(graph: &WorkflowGraph) -> Vec<SkipDecision> {
    let mut groups: BTreeMap<SkipGroup, Vec<(u32, JobName)>> = BTreeMap::new();

    for job in graph.jobs() {
        if !job.skippable || !matches!(job.status, Status::Ready | Status::Queuing) {
            continue;
        }
        let (group, ordinal) = match job.running {
            RunningType::Chunk => match job.chunk {
                Some(chunk) => (
                    (job.section.clone(), job.date, job.member.clone(), job.split),
                    chunk,
                ),
                None => continue,
            },
            RunningType::Member => ((job.section.clone(), job.date, None, job.split), job.priority),
            RunningType::Once | RunningType::Date => continue,
        };
        groups.entry(group).or_default().push((ordinal, job.name.clone()));
    }

    let mut decisions = Vec::new();
    for (_, mut members) in groups {
        if members.len() < 2 {
            continue;
        }
        members.sort();
        members.pop();
        for (_, name) in members {
            let remote_id = graph
                .get(&name)
                .filter(|job| job.status == Status::Queuing)
                .and_then(|job| job.remote_id.clone());
            decisions.push(SkipDecision { job: name, remote_id });
        }
    }
    decisions
}
