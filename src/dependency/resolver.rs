// src/dependency/resolver.rs

//! Turns parsed dependencies into graph edges.
//!
//! For every instance of a section and every dependency of that section:
//!
//! 1. a `*N` delay drops the dependency for chunks `<= N`;
//! 2. a `-N`/`+N` offset moves the anchor coordinate along the target's
//!    running axis;
//! 3. the relationship tree (if any) is evaluated into an
//!    [`AxisFilterResult`];
//! 4. a natural filter binds to the target instances sharing the anchor
//!    coordinate, a non-natural one to the instances the filter selects;
//! 5. low-frequency sections catch up on the skipped positions.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Bfs;
use tracing::{debug, warn};

use crate::config::{ExperimentConfig, SectionConfig};
use crate::dag::WorkflowGraph;
use crate::dependency::filter::{AxisFilter, AxisFilterResult, AxisValues, filter_current_job};
use crate::dependency::model::{Dependency, FilterItem, Sign};
use crate::dependency::parser::{DependencyParseError, parse_dependency_key, parse_relation_tree};
use crate::errors::Result;
use crate::job::{Coordinates, EdgeInfo, Job, JobKey, JobName, StartDate, Status};
use crate::types::{Axis, RunningType};

/// Counts reported by [`DependencyResolver::wire_sections`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireStats {
    pub jobs: usize,
    pub edges: usize,
}

/// Split mapping between a child split and the parent splits.
///
/// - Equal counts bind 1-to-1.
/// - More parent splits: the parents are cut into blocks of
///   `ceil(parent / child)` and child split `s` binds to block `s`.
/// - More child splits: blocks of `ceil(child / parent)` children share
///   one parent.
///
/// An explicit multiplier replaces the computed block size.
pub fn split_block(
    child_split: u32,
    child_splits: u32,
    parent_splits: u32,
    multiplier: Option<u32>,
) -> Vec<u32> {
    if parent_splits == 0 {
        return Vec::new();
    }
    if child_splits == 0 {
        return (1..=parent_splits).collect();
    }
    let s = child_split.clamp(1, child_splits);
    let multiplier = multiplier.filter(|m| *m > 0);

    if parent_splits == child_splits && multiplier.is_none() {
        return vec![s];
    }

    if parent_splits >= child_splits {
        let block = multiplier.unwrap_or_else(|| parent_splits.div_ceil(child_splits));
        let start = (s - 1).saturating_mul(block).saturating_add(1);
        let end = s.saturating_mul(block).min(parent_splits);
        if start > parent_splits {
            return Vec::new();
        }
        (start..=end).collect()
    } else {
        let block = multiplier.unwrap_or_else(|| child_splits.div_ceil(parent_splits));
        vec![((s - 1) / block + 1).min(parent_splits)]
    }
}

/// Sections whose dependencies reach any of `seeds`, directly or
/// transitively, plus the seeds themselves.
///
/// Works on the raw dependency keys, so sections depending on a removed
/// section are included too.
pub fn dependents_closure(config: &ExperimentConfig, seeds: &BTreeSet<String>) -> BTreeSet<String> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for seed in seeds.iter() {
        graph.add_node(seed.as_str());
    }

    let parsed: Vec<(String, String)> = config
        .jobs
        .iter()
        .flat_map(|(section, cfg)| {
            cfg.dependencies
                .keys()
                .into_iter()
                .filter_map(|key| parse_dependency_key(&key).ok())
                .map(move |dep| (dep.section, section.clone()))
        })
        .collect();
    for (target, dependent) in parsed.iter() {
        graph.add_edge(target.as_str(), dependent.as_str(), ());
    }

    let mut affected = BTreeSet::new();
    for seed in seeds.iter() {
        let mut bfs = Bfs::new(&graph, seed.as_str());
        while let Some(section) = bfs.next(&graph) {
            affected.insert(section.to_string());
        }
    }
    affected
}

/// Anchor coordinate of a dependency after applying its offset.
#[derive(Debug, Clone)]
struct Anchor {
    coords: Coordinates,
    walk: Option<Walk>,
}

#[derive(Debug, Clone, Copy)]
struct Walk {
    axis: Axis,
    position: usize,
    forward: bool,
}

/// Axis values present among one section's instances.
///
/// Parents are found by enumerating candidate keys over these values and
/// looking each one up in the graph's key index.
#[derive(Debug, Default)]
struct SectionAxes {
    dates: BTreeSet<Option<StartDate>>,
    members: BTreeSet<Option<String>>,
    chunks: BTreeSet<Option<u32>>,
    splits: BTreeSet<Option<u32>>,
}

impl SectionAxes {
    fn collect(graph: &WorkflowGraph, section: &str) -> Self {
        let mut axes = SectionAxes::default();
        for job in graph.section_jobs(section) {
            axes.dates.insert(job.date);
            axes.members.insert(job.member.clone());
            axes.chunks.insert(job.chunk);
            axes.splits.insert(job.split);
        }
        axes
    }

    /// Jobs of `section` at every combination of the given values, in
    /// creation order.
    fn lookup<'g>(
        &self,
        graph: &'g WorkflowGraph,
        section: &str,
        dates: &[Option<StartDate>],
        members: &[Option<String>],
        chunks: &[Option<u32>],
    ) -> Vec<&'g Job> {
        let mut out = Vec::new();
        for date in dates {
            for member in members {
                for chunk in chunks {
                    for split in self.splits.iter() {
                        let key = JobKey {
                            section: section.to_string(),
                            coords: Coordinates {
                                date: *date,
                                member: member.clone(),
                                chunk: *chunk,
                                split: *split,
                            },
                        };
                        out.extend(graph.job_by_key(&key));
                    }
                }
            }
        }
        out.sort_by_key(|job| job.priority);
        out
    }
}

/// Lookup tables of every dependency target, built once per wiring pass.
type TargetIndex = BTreeMap<String, SectionAxes>;

/// Owns the parsed dependencies of one build.
#[derive(Debug, Clone)]
pub struct DependencyResolver<'a> {
    config: &'a ExperimentConfig,
    dependencies: BTreeMap<String, Vec<Dependency>>,
    chained: BTreeSet<String>,
    values: AxisValues,
}

impl<'a> DependencyResolver<'a> {
    /// Parse every section's dependencies. Malformed entries and unknown
    /// targets are logged and dropped.
    pub fn new(config: &'a ExperimentConfig) -> Self {
        let mut dependencies = BTreeMap::new();
        for (section, cfg) in config.jobs.iter() {
            let mut parsed = Vec::new();
            for key in cfg.dependencies.keys() {
                match parse_dependency(config, cfg, &key) {
                    Ok(Some(dep)) => parsed.push(dep),
                    Ok(None) => {}
                    Err(err) => {
                        warn!(section = %section, key = %key, error = %err, "dropping malformed dependency");
                    }
                }
            }
            dependencies.insert(section.clone(), parsed);
        }

        let chained = dependencies
            .iter()
            .filter(|(section, deps)| {
                deps.iter()
                    .any(|d| d.target_section == **section && d.sign == Some(Sign::Minus))
            })
            .map(|(section, _)| section.clone())
            .collect();

        let values = AxisValues {
            dates: config.axes.dates.iter().map(|d| d.to_string()).collect(),
            members: config.axes.members.clone(),
            chunks: config.axes.chunks.iter().map(|c| c.to_string()).collect(),
        };

        Self {
            config,
            dependencies,
            chained,
            values,
        }
    }

    pub fn dependencies_of(&self, section: &str) -> &[Dependency] {
        self.dependencies
            .get(section)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sections depending on their own previous instance (`SECTION-N`).
    pub fn is_chained(&self, section: &str) -> bool {
        self.chained.contains(section)
    }

    /// Wire the incoming edges of every instance of `sections`.
    pub fn wire_sections(
        &self,
        graph: &mut WorkflowGraph,
        sections: &BTreeSet<String>,
    ) -> Result<WireStats> {
        let mut stats = WireStats::default();

        let targets: BTreeSet<&str> = sections
            .iter()
            .flat_map(|section| self.dependencies_of(section))
            .map(|dep| dep.target_section.as_str())
            .collect();
        let index: TargetIndex = targets
            .into_iter()
            .map(|target| (target.to_string(), SectionAxes::collect(graph, target)))
            .collect();

        for section in sections.iter() {
            let deps = self.dependencies_of(section);
            if deps.is_empty() {
                continue;
            }
            let children: Vec<JobName> = graph
                .section_jobs(section)
                .iter()
                .map(|job| job.name.clone())
                .collect();

            for child in children {
                let job = graph.try_get(&child)?;
                let mut edges: Vec<(JobName, EdgeInfo)> = Vec::new();
                for dep in deps {
                    edges.extend(self.parents_for(graph, &index, job, dep));
                }
                for (parent, info) in edges {
                    graph.add_edge(&parent, &child, info)?;
                    stats.edges += 1;
                }
                stats.jobs += 1;
            }
            debug!(section = %section, "wired section dependencies");
        }

        Ok(stats)
    }

    /// Parents of `job` contributed by `dep`, with their edge conditions.
    fn parents_for(
        &self,
        graph: &WorkflowGraph,
        index: &TargetIndex,
        job: &Job,
        dep: &Dependency,
    ) -> Vec<(JobName, EdgeInfo)> {
        if let (Some(delay), Some(chunk)) = (dep.delay, job.chunk) {
            if chunk <= delay {
                return Vec::new();
            }
        }

        let Some(anchor) = self.anchor(job, dep) else {
            return Vec::new();
        };

        let filter = dep
            .relationships
            .as_ref()
            .map(|root| filter_current_job(root, job, &self.values))
            .unwrap_or_default();
        let base = EdgeInfo {
            status: filter.status.unwrap_or(Status::Completed),
            from_step: filter.from_step.unwrap_or(0),
            optional: dep.optional,
        };

        let mut parents: Vec<(JobName, EdgeInfo)> = Vec::new();
        if filter.is_natural() {
            let mut candidates = self.natural_candidates(graph, index, job, dep, &anchor);
            if self.is_chained(&dep.target_section) {
                candidates = keep_latest_chunks(candidates);
            }
            parents.extend(candidates.into_iter().map(|p| (p.name.clone(), base)));

            if !matches!(dep.sign, Some(Sign::Minus | Sign::Plus)) && job.frequency > 1 {
                for p in self.catch_up_candidates(graph, index, job, dep) {
                    if !parents.iter().any(|(name, _)| *name == p.name) {
                        parents.push((p.name.clone(), base));
                    }
                }
            }
        } else {
            debug!(job = %job.name, dependency = %dep.key, filter = %filter, "applying relationship filter");
            for (p, optional) in self.filtered_candidates(graph, index, job, dep, &anchor, &filter) {
                let info = EdgeInfo {
                    optional: base.optional || optional,
                    ..base
                };
                parents.push((p.name.clone(), info));
            }
        }

        parents
    }

    /// Apply the dependency offset. `None` means the offset walks past the
    /// start of the axis and no edge is wired.
    fn anchor(&self, job: &Job, dep: &Dependency) -> Option<Anchor> {
        let coords = job.coordinates();
        let delta = dep.signed_offset();
        let unchanged = Anchor {
            coords: coords.clone(),
            walk: None,
        };
        if delta == 0 {
            return Some(unchanged);
        }

        let Some(axis) = dep.running_type.offset_axis() else {
            debug!(job = %job.name, dependency = %dep.key, "offset on a once section ignored");
            return Some(unchanged);
        };
        let Some(current) = self.axis_position(&coords, axis) else {
            debug!(
                job = %job.name,
                dependency = %dep.key,
                "job has no coordinate on the offset axis; offset ignored"
            );
            return Some(unchanged);
        };

        let len = self.axis_len(axis);
        let target = current as i64 + delta;
        if target < 0 {
            return None;
        }
        let mut position = target as usize;
        if position >= len {
            warn!(
                job = %job.name,
                dependency = %dep.key,
                "offset walks past the end of the axis; clamping to the last position"
            );
            position = len.saturating_sub(1);
        }

        Some(Anchor {
            coords: self.with_position(&coords, axis, position),
            walk: Some(Walk {
                axis,
                position,
                forward: delta > 0,
            }),
        })
    }

    fn natural_candidates<'g>(
        &self,
        graph: &'g WorkflowGraph,
        index: &TargetIndex,
        job: &Job,
        dep: &Dependency,
        anchor: &Anchor,
    ) -> Vec<&'g Job> {
        let chunk_walk = anchor.walk.is_some_and(|w| w.axis == Axis::Chunk);
        let found = self.natural_at(graph, index, job, dep, &anchor.coords, chunk_walk);
        if !found.is_empty() {
            return found;
        }

        // The offset landed on a thinned-out position: take the closest
        // valid step in the walking direction.
        let Some(walk) = anchor.walk else {
            return found;
        };
        let positions: Vec<usize> = if walk.forward {
            (walk.position + 1..self.axis_len(walk.axis)).collect()
        } else {
            (0..walk.position).rev().collect()
        };
        for position in positions {
            let coords = self.with_position(&anchor.coords, walk.axis, position);
            let found = self.natural_at(graph, index, job, dep, &coords, chunk_walk);
            if !found.is_empty() {
                debug!(job = %job.name, dependency = %dep.key, position, "offset moved to closest valid step");
                return found;
            }
        }
        Vec::new()
    }

    fn natural_at<'g>(
        &self,
        graph: &'g WorkflowGraph,
        index: &TargetIndex,
        job: &Job,
        dep: &Dependency,
        coords: &Coordinates,
        chunk_walk: bool,
    ) -> Vec<&'g Job> {
        let Some(axes) = index.get(&dep.target_section) else {
            return Vec::new();
        };
        axes.lookup(
            graph,
            &dep.target_section,
            &narrow(&axes.dates, coords.date.as_ref()),
            &narrow(&axes.members, coords.member.as_ref()),
            &narrow(&axes.chunks, coords.chunk.as_ref()),
        )
        .into_iter()
        .filter(|t| t.name != job.name && natural_split_match(job, t, chunk_walk))
        .collect()
    }

    /// Positions `1..frequency` before the job on its own running axis.
    fn catch_up_candidates<'g>(
        &self,
        graph: &'g WorkflowGraph,
        index: &TargetIndex,
        job: &Job,
        dep: &Dependency,
    ) -> Vec<&'g Job> {
        let Some(axis) = job.running.offset_axis() else {
            return Vec::new();
        };
        if !varies_on(dep.running_type, axis) {
            return Vec::new();
        }
        let coords = job.coordinates();
        let Some(current) = self.axis_position(&coords, axis) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for back in 1..job.frequency as usize {
            let Some(position) = current.checked_sub(back) else {
                break;
            };
            let shifted = self.with_position(&coords, axis, position);
            out.extend(self.natural_at(graph, index, job, dep, &shifted, false));
        }
        out
    }

    fn filtered_candidates<'g>(
        &self,
        graph: &'g WorkflowGraph,
        index: &TargetIndex,
        job: &Job,
        dep: &Dependency,
        anchor: &Anchor,
        filter: &AxisFilterResult,
    ) -> Vec<(&'g Job, bool)> {
        if filter.selects_nothing() {
            return Vec::new();
        }
        let Some(axes) = index.get(&dep.target_section) else {
            return Vec::new();
        };
        let chunk_walk = anchor.walk.is_some_and(|w| w.axis == Axis::Chunk);
        let lists = [Axis::Date, Axis::Member, Axis::Chunk].map(|axis| self.values.of(axis, 0));

        let own = &anchor.coords;
        let dates = keep_selected(&axes.dates, own.date.as_ref(), filter.axis(Axis::Date), &lists[0]);
        let members =
            keep_selected(&axes.members, own.member.as_ref(), filter.axis(Axis::Member), &lists[1]);
        let chunks = keep_selected(&axes.chunks, own.chunk.as_ref(), filter.axis(Axis::Chunk), &lists[2]);
        let candidates = axes.lookup(graph, &dep.target_section, &dates, &members, &chunks);

        let mut out = Vec::new();
        'targets: for t in candidates {
            if t.name == job.name {
                continue;
            }
            let mut optional = false;
            let coords = t.coordinates();

            let axes_with_values = [Axis::Date, Axis::Member, Axis::Chunk].into_iter().zip(lists.iter());
            for (axis, list) in axes_with_values {
                let own = axis_value(&anchor.coords, axis);
                let theirs = axis_value(&coords, axis);
                match filter.axis(axis) {
                    AxisFilter::Unset | AxisFilter::Natural => {
                        if !loose_eq(own.as_ref(), theirs.as_ref()) {
                            continue 'targets;
                        }
                    }
                    AxisFilter::All { optional: o } => optional |= *o,
                    AxisFilter::None => continue 'targets,
                    AxisFilter::Values(items) => {
                        let Some(theirs) = theirs else {
                            continue;
                        };
                        match matching_items(items, &theirs, list) {
                            Some(all_optional) => optional |= all_optional,
                            None => continue 'targets,
                        }
                    }
                }
            }

            if let Some(split) = t.split {
                match filter.axis(Axis::Split) {
                    AxisFilter::Unset | AxisFilter::Natural => {
                        if !natural_split_match(job, t, chunk_walk) {
                            continue;
                        }
                    }
                    AxisFilter::All { optional: o } => optional |= *o,
                    AxisFilter::None => continue,
                    AxisFilter::Values(items) => {
                        let list = self.values.of(Axis::Split, t.splits);
                        let matched: Vec<&FilterItem> = items
                            .iter()
                            .filter(|item| {
                                list.iter()
                                    .position(|v| *v == split.to_string())
                                    .is_some_and(|pos| item.positions(&list).contains(&pos))
                            })
                            .collect();
                        if matched.is_empty() {
                            continue;
                        }
                        if let Some(child_split) = job.split {
                            if matched.iter().any(|item| maps_splits(item)) {
                                let multiplier = matched.iter().find_map(|item| item.multiplier());
                                let block = split_block(child_split, job.splits, t.splits, multiplier);
                                if !block.contains(&split) {
                                    continue;
                                }
                            }
                        }
                        optional |= matched.iter().all(|item| item.optional());
                    }
                }
            }

            out.push((t, optional));
        }
        out
    }

    fn axis_len(&self, axis: Axis) -> usize {
        match axis {
            Axis::Date => self.config.axes.dates.len(),
            Axis::Member => self.config.axes.members.len(),
            Axis::Chunk => self.config.axes.chunks.len(),
            Axis::Split => 0,
        }
    }

    fn axis_position(&self, coords: &Coordinates, axis: Axis) -> Option<usize> {
        let axes = &self.config.axes;
        match axis {
            Axis::Date => coords.date.as_ref().and_then(|d| axes.date_position(d)),
            Axis::Member => coords.member.as_deref().and_then(|m| axes.member_position(m)),
            Axis::Chunk => coords.chunk.and_then(|c| axes.chunk_position(c)),
            Axis::Split => None,
        }
    }

    fn with_position(&self, coords: &Coordinates, axis: Axis, position: usize) -> Coordinates {
        let axes = &self.config.axes;
        let mut moved = coords.clone();
        match axis {
            Axis::Date => moved.date = axes.dates.get(position).copied(),
            Axis::Member => moved.member = axes.members.get(position).cloned(),
            Axis::Chunk => moved.chunk = axes.chunks.get(position).copied(),
            Axis::Split => {}
        }
        moved
    }
}

fn parse_dependency(
    config: &ExperimentConfig,
    section: &SectionConfig,
    key: &str,
) -> std::result::Result<Option<Dependency>, DependencyParseError> {
    let parsed = parse_dependency_key(key)?;
    let Some(target) = config.section(&parsed.section) else {
        warn!(key = %key, target = %parsed.section, "dependency on unknown section dropped");
        return Ok(None);
    };

    let relationships = match section.dependencies.relationships_of(key) {
        Some(value) => parse_relation_tree(key, value)?,
        None => None,
    };

    Ok(Some(Dependency {
        key: key.to_string(),
        target_section: parsed.section,
        running_type: target.running,
        sign: parsed.sign,
        offset: parsed.offset,
        delay: parsed.delay,
        optional: parsed.optional,
        relationships,
    }))
}

/// Values of `present` that loosely equal `anchor`.
fn narrow<T: Ord + Clone>(present: &BTreeSet<Option<T>>, anchor: Option<&T>) -> Vec<Option<T>> {
    match anchor {
        Some(value) => present
            .iter()
            .filter(|p| p.as_ref().is_none_or(|p| p == value))
            .cloned()
            .collect(),
        None => present.iter().cloned().collect(),
    }
}

/// Values of `present` an axis filter can select. Instances without a
/// coordinate on the axis always stay in.
fn keep_selected<T: Ord + Clone + ToString>(
    present: &BTreeSet<Option<T>>,
    anchor: Option<&T>,
    filter: &AxisFilter,
    list: &[String],
) -> Vec<Option<T>> {
    match filter {
        AxisFilter::Unset | AxisFilter::Natural => narrow(present, anchor),
        AxisFilter::All { .. } => present.iter().cloned().collect(),
        AxisFilter::None => Vec::new(),
        AxisFilter::Values(items) => present
            .iter()
            .filter(|p| {
                p.as_ref()
                    .is_none_or(|v| matching_items(items, &v.to_string(), list).is_some())
            })
            .cloned()
            .collect(),
    }
}

/// Equal, or one side does not vary along the axis.
fn loose_eq<T: PartialEq>(a: Option<&T>, b: Option<&T>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn axis_value(coords: &Coordinates, axis: Axis) -> Option<String> {
    match axis {
        Axis::Date => coords.date.map(|d| d.to_string()),
        Axis::Member => coords.member.clone(),
        Axis::Chunk => coords.chunk.map(|c| c.to_string()),
        Axis::Split => coords.split.map(|s| s.to_string()),
    }
}

/// Whether instances of `running` carry a coordinate on `axis`.
fn varies_on(running: RunningType, axis: Axis) -> bool {
    matches!(
        (running, axis),
        (RunningType::Chunk, Axis::Date | Axis::Member | Axis::Chunk)
            | (RunningType::Member, Axis::Date | Axis::Member)
            | (RunningType::Date, Axis::Date)
    )
}

fn natural_split_match(child: &Job, parent: &Job, chunk_walk: bool) -> bool {
    match (child.split, parent.split) {
        (Some(s), Some(p)) if !chunk_walk => {
            split_block(s, child.splits, parent.splits, None).contains(&p)
        }
        _ => true,
    }
}

/// `Some(all matching items optional)` if any item selects `value`.
fn matching_items(items: &[FilterItem], value: &str, list: &[String]) -> Option<bool> {
    let position = list.iter().position(|v| v == value)?;
    let matched: Vec<&FilterItem> = items
        .iter()
        .filter(|item| item.positions(list).contains(&position))
        .collect();
    if matched.is_empty() {
        None
    } else {
        Some(matched.iter().all(|item| item.optional()))
    }
}

/// Split items that ask for the block mapping: a multiplier, or a range
/// running to `auto`.
fn maps_splits(item: &FilterItem) -> bool {
    match item {
        FilterItem::Value { multiplier, .. } => multiplier.is_some(),
        FilterItem::Range { end, multiplier, .. } => {
            multiplier.is_some() || end.as_deref().is_some_and(|e| e.eq_ignore_ascii_case("auto"))
        }
        _ => false,
    }
}

/// Keep only the most advanced chunk per (date, member, split).
fn keep_latest_chunks(candidates: Vec<&Job>) -> Vec<&Job> {
    let mut latest: BTreeMap<Coordinates, &Job> = BTreeMap::new();
    let mut out = Vec::new();
    for job in candidates {
        let Some(chunk) = job.chunk else {
            out.push(job);
            continue;
        };
        let group = Coordinates {
            chunk: None,
            ..job.coordinates()
        };
        match latest.get(&group) {
            Some(current) if current.chunk.is_some_and(|c| c >= chunk) => {}
            _ => {
                latest.insert(group, job);
            }
        }
    }
    out.extend(latest.into_values());
    out
}
