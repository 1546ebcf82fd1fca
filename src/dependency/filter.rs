// src/dependency/filter.rs

//! Evaluation of a relationship tree against one job instance.
//!
//! The tree is walked from the root: every `*_TO` fragment of a reached
//! node is collected, and the node's `*_FROM` clause descends into each
//! branch whose key selects the job's own coordinate. The collected
//! fragments are then unified into one [`AxisFilterResult`].

use std::collections::BTreeMap;
use std::fmt;

use crate::dependency::model::{FilterItem, RelationNode};
use crate::job::{Job, Status};
use crate::types::Axis;

/// Axis value lists rendered as strings, in axis order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AxisValues {
    pub dates: Vec<String>,
    pub members: Vec<String>,
    pub chunks: Vec<String>,
}

impl AxisValues {
    /// Values of `axis`; splits are `1..=splits` of the section at hand.
    pub fn of(&self, axis: Axis, splits: u32) -> Vec<String> {
        match axis {
            Axis::Date => self.dates.clone(),
            Axis::Member => self.members.clone(),
            Axis::Chunk => self.chunks.clone(),
            Axis::Split => (1..=splits).map(|s| s.to_string()).collect(),
        }
    }
}

/// Coordinate of `job` on `axis`, rendered like the axis values.
pub fn job_axis_value(job: &Job, axis: Axis) -> Option<String> {
    match axis {
        Axis::Date => job.date.map(|d| d.to_string()),
        Axis::Member => job.member.clone(),
        Axis::Chunk => job.chunk.map(|c| c.to_string()),
        Axis::Split => job.split.map(|s| s.to_string()),
    }
}

/// Unified filter for one axis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AxisFilter {
    /// No fragment mentioned the axis.
    #[default]
    Unset,
    All {
        optional: bool,
    },
    None,
    Natural,
    Values(Vec<FilterItem>),
}

impl AxisFilter {
    /// Merge the fragments collected for one axis.
    ///
    /// `all` absorbs everything else; `none`/`natural` only count when no
    /// other item is present; concrete items are concatenated without
    /// duplicates.
    pub fn unify(items: &[FilterItem]) -> AxisFilter {
        let alls: Vec<&FilterItem> = items
            .iter()
            .filter(|i| matches!(i, FilterItem::All { .. }))
            .collect();
        if !alls.is_empty() {
            return AxisFilter::All {
                optional: alls.iter().all(|i| i.optional()),
            };
        }

        let mut concrete: Vec<FilterItem> = Vec::new();
        for item in items.iter().filter(|i| i.is_concrete()) {
            if !concrete.contains(item) {
                concrete.push(item.clone());
            }
        }
        if !concrete.is_empty() {
            return AxisFilter::Values(concrete);
        }

        match items.first() {
            Some(FilterItem::None) => AxisFilter::None,
            Some(FilterItem::Natural) => AxisFilter::Natural,
            _ => AxisFilter::Unset,
        }
    }

    pub fn is_natural(&self) -> bool {
        matches!(self, AxisFilter::Unset | AxisFilter::Natural)
    }
}

impl fmt::Display for AxisFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisFilter::Unset => Ok(()),
            AxisFilter::All { optional } => {
                f.write_str("all")?;
                if *optional {
                    f.write_str("?")?;
                }
                Ok(())
            }
            AxisFilter::None => f.write_str("none"),
            AxisFilter::Natural => f.write_str("natural"),
            AxisFilter::Values(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

/// Result of evaluating a relationship tree for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AxisFilterResult {
    pub dates: AxisFilter,
    pub members: AxisFilter,
    pub chunks: AxisFilter,
    pub splits: AxisFilter,
    pub status: Option<Status>,
    pub from_step: Option<u32>,
}

impl AxisFilterResult {
    pub fn axis(&self, axis: Axis) -> &AxisFilter {
        match axis {
            Axis::Date => &self.dates,
            Axis::Member => &self.members,
            Axis::Chunk => &self.chunks,
            Axis::Split => &self.splits,
        }
    }

    fn axis_mut(&mut self, axis: Axis) -> &mut AxisFilter {
        match axis {
            Axis::Date => &mut self.dates,
            Axis::Member => &mut self.members,
            Axis::Chunk => &mut self.chunks,
            Axis::Split => &mut self.splits,
        }
    }

    /// No axis carries a filter: the natural parent set applies.
    pub fn is_natural(&self) -> bool {
        Axis::OUTERMOST_FIRST
            .iter()
            .all(|axis| self.axis(*axis).is_natural())
    }

    /// Some axis explicitly selects nothing.
    pub fn selects_nothing(&self) -> bool {
        Axis::OUTERMOST_FIRST
            .iter()
            .any(|axis| matches!(self.axis(*axis), AxisFilter::None))
    }
}

impl fmt::Display for AxisFilterResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for axis in Axis::OUTERMOST_FIRST {
            let filter = self.axis(axis);
            if matches!(filter, AxisFilter::Unset) {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{}={}", axis.to_key(), filter)?;
        }
        if let Some(status) = self.status {
            write!(f, " STATUS={status}")?;
        }
        if let Some(step) = self.from_step {
            write!(f, " FROM_STEP={step}")?;
        }
        Ok(())
    }
}

/// Walk `root` for `job` and unify the matched fragments.
///
/// `splits` is the split count of the job's own section, used to match
/// `SPLITS_FROM` keys.
pub fn filter_current_job(
    root: &RelationNode,
    job: &Job,
    values: &AxisValues,
) -> AxisFilterResult {
    let mut fragments: BTreeMap<Axis, Vec<FilterItem>> = BTreeMap::new();
    let mut result = AxisFilterResult::default();
    collect(root, job, values, &mut fragments, &mut result);

    for (axis, items) in fragments.iter() {
        *result.axis_mut(*axis) = AxisFilter::unify(items);
    }
    result
}

fn collect(
    node: &RelationNode,
    job: &Job,
    values: &AxisValues,
    fragments: &mut BTreeMap<Axis, Vec<FilterItem>>,
    result: &mut AxisFilterResult,
) {
    for (axis, expr) in node.to.iter() {
        fragments
            .entry(*axis)
            .or_default()
            .extend(expr.items.iter().cloned());
    }
    // Deeper nodes are visited later, so the innermost condition wins.
    if node.status.is_some() {
        result.status = node.status;
    }
    if node.from_step.is_some() {
        result.from_step = node.from_step;
    }

    let Some(from) = &node.from else {
        return;
    };
    let own = job_axis_value(job, from.axis);
    let axis_values = values.of(from.axis, job.splits);
    for (selector, branch) in from.branches.iter() {
        if selector.matches(own.as_deref(), &axis_values) {
            collect(branch, job, values, fragments, result);
        }
    }
}
