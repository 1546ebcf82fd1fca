// src/dependency/model.rs

//! Parsed forms of the dependency expression language.

use std::collections::BTreeMap;
use std::fmt;

use crate::job::Status;
use crate::types::{Axis, RunningType};

/// Sign of a dependency key: `SIM-1`, `SIM+1`, `SIM*2`, `SIM?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Minus,
    Plus,
    Star,
    Question,
}

impl Sign {
    pub fn as_char(self) -> char {
        match self {
            Sign::Minus => '-',
            Sign::Plus => '+',
            Sign::Star => '*',
            Sign::Question => '?',
        }
    }
}

/// A dependency key split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyKey {
    pub section: String,
    pub sign: Option<Sign>,
    /// Distance for `-`/`+` keys.
    pub offset: Option<u32>,
    /// Chunk delay for `*` keys.
    pub delay: Option<u32>,
    /// Trailing `?`: the whole dependency is weak.
    pub optional: bool,
}

/// One item of a filter expression such as `"fc0,fc1?"` or `"[1:3]"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterItem {
    All {
        optional: bool,
    },
    None,
    Natural,
    Value {
        value: String,
        optional: bool,
        multiplier: Option<u32>,
    },
    /// Inclusive range over axis positions. Bounds are axis values or
    /// zero-based indices; a missing or `auto` end means "to the last".
    Range {
        start: Option<String>,
        end: Option<String>,
        step: u32,
        optional: bool,
        multiplier: Option<u32>,
    },
}

impl FilterItem {
    pub fn is_concrete(&self) -> bool {
        matches!(self, FilterItem::Value { .. } | FilterItem::Range { .. })
    }

    pub fn optional(&self) -> bool {
        match self {
            FilterItem::All { optional }
            | FilterItem::Value { optional, .. }
            | FilterItem::Range { optional, .. } => *optional,
            FilterItem::None | FilterItem::Natural => false,
        }
    }

    pub fn multiplier(&self) -> Option<u32> {
        match self {
            FilterItem::Value { multiplier, .. } | FilterItem::Range { multiplier, .. } => {
                *multiplier
            }
            _ => None,
        }
    }

    /// Axis positions selected by a concrete item.
    pub fn positions(&self, values: &[String]) -> Vec<usize> {
        match self {
            FilterItem::All { .. } => (0..values.len()).collect(),
            FilterItem::None | FilterItem::Natural => Vec::new(),
            FilterItem::Value { value, .. } => values
                .iter()
                .position(|v| v == value)
                .into_iter()
                .collect(),
            FilterItem::Range {
                start, end, step, ..
            } => {
                if values.is_empty() {
                    return Vec::new();
                }
                let last = values.len() - 1;
                let first = match start {
                    Some(bound) => match bound_position(bound, values) {
                        Some(p) => p,
                        None => return Vec::new(),
                    },
                    None => 0,
                };
                let stop = match end {
                    Some(bound) if !bound.eq_ignore_ascii_case("auto") => {
                        bound_position(bound, values).unwrap_or(last)
                    }
                    _ => last,
                };
                if first > stop {
                    return Vec::new();
                }
                (first..=stop).step_by((*step).max(1) as usize).collect()
            }
        }
    }
}

fn bound_position(bound: &str, values: &[String]) -> Option<usize> {
    values
        .iter()
        .position(|v| v == bound)
        .or_else(|| bound.parse::<usize>().ok().filter(|i| *i < values.len()))
}

impl fmt::Display for FilterItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (optional, multiplier) = match self {
            FilterItem::All { optional } => {
                f.write_str("all")?;
                (*optional, None)
            }
            FilterItem::None => return f.write_str("none"),
            FilterItem::Natural => return f.write_str("natural"),
            FilterItem::Value {
                value,
                optional,
                multiplier,
            } => {
                f.write_str(value)?;
                (*optional, *multiplier)
            }
            FilterItem::Range {
                start,
                end,
                step,
                optional,
                multiplier,
            } => {
                write!(
                    f,
                    "[{}:{}",
                    start.as_deref().unwrap_or(""),
                    end.as_deref().unwrap_or("")
                )?;
                if *step != 1 {
                    write!(f, ":{step}")?;
                }
                f.write_str("]")?;
                (*optional, *multiplier)
            }
        };
        if let Some(m) = multiplier {
            write!(f, "*{m}")?;
        }
        if optional {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// A comma- or whitespace-separated list of [`FilterItem`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterExpr {
    pub items: Vec<FilterItem>,
}

impl FilterExpr {
    /// Whether a job coordinate (rendered as a string) is selected, used for
    /// `*_FROM` keys. A job without a coordinate on the axis only matches
    /// `all`.
    pub fn matches(&self, value: Option<&str>, values: &[String]) -> bool {
        let Some(value) = value else {
            return self
                .items
                .iter()
                .any(|item| matches!(item, FilterItem::All { .. }));
        };
        let Some(position) = values.iter().position(|v| v == value) else {
            return false;
        };
        self.items
            .iter()
            .any(|item| item.positions(values).contains(&position))
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{item}")?;
        }
        Ok(())
    }
}

/// Relationship filter tree attached to a dependency.
///
/// `to` fragments apply whenever the node is reached; `from` descends into
/// the branches whose key matches the job's own coordinate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationNode {
    pub to: BTreeMap<Axis, FilterExpr>,
    pub from: Option<FromClause>,
    pub status: Option<Status>,
    pub from_step: Option<u32>,
}

impl RelationNode {
    pub fn is_trivial(&self) -> bool {
        self.to.is_empty() && self.from.is_none() && self.status.is_none() && self.from_step.is_none()
    }
}

/// The outermost `*_FROM` key of a relation node.
#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    pub axis: Axis,
    pub branches: Vec<(FilterExpr, RelationNode)>,
}

/// Fully parsed dependency of a section on a target section.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    /// Key as written in the configuration.
    pub key: String,
    pub target_section: String,
    /// Running type of the target section.
    pub running_type: RunningType,
    pub sign: Option<Sign>,
    pub offset: Option<u32>,
    /// Only applies to child chunks greater than this.
    pub delay: Option<u32>,
    pub optional: bool,
    pub relationships: Option<RelationNode>,
}

impl Dependency {
    /// Signed distance along the target's running axis.
    pub fn signed_offset(&self) -> i64 {
        match (self.sign, self.offset) {
            (Some(Sign::Minus), Some(n)) => -i64::from(n),
            (Some(Sign::Plus), Some(n)) => i64::from(n),
            _ => 0,
        }
    }
}
