// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::warn;

use crate::config::model::{Axes, ExperimentConfig, RawExperimentConfig};
use crate::dependency::parser::parse_dependency_key;
use crate::dependency::Sign;
use crate::errors::{ExpflowError, Result};
use crate::job::StartDate;
use crate::types::RunningType;

impl TryFrom<RawExperimentConfig> for ExperimentConfig {
    type Error = ExpflowError;

    fn try_from(raw: RawExperimentConfig) -> std::result::Result<Self, Self::Error> {
        let axes = validate_raw_config(&raw)?;
        Ok(ExperimentConfig::new_unchecked(raw, axes))
    }
}

fn validate_raw_config(cfg: &RawExperimentConfig) -> Result<Axes> {
    ensure_has_sections(cfg)?;
    let axes = parse_axes(cfg)?;
    validate_sections(cfg, &axes)?;
    validate_wrappers(cfg)?;
    warn_on_section_cycles(cfg);
    Ok(axes)
}

fn ensure_has_sections(cfg: &RawExperimentConfig) -> Result<()> {
    if cfg.jobs.is_empty() {
        return Err(ExpflowError::ConfigError(
            "config must contain at least one [jobs.<SECTION>] section".to_string(),
        ));
    }
    if cfg.experiment.expid.trim().is_empty() {
        return Err(ExpflowError::ConfigError(
            "[experiment].expid must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn parse_axes(cfg: &RawExperimentConfig) -> Result<Axes> {
    let dates = cfg
        .experiment
        .dates
        .iter()
        .map(|d| d.parse::<StartDate>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ExpflowError::ConfigError(format!("[experiment].dates: {e}")))?;

    let first = cfg.experiment.chunk_ini.max(1);
    let chunks = if cfg.experiment.num_chunks >= first {
        (first..=cfg.experiment.num_chunks).collect()
    } else {
        Vec::new()
    };

    Ok(Axes {
        dates,
        members: cfg.experiment.members.clone(),
        chunks,
    })
}

fn validate_sections(cfg: &RawExperimentConfig, axes: &Axes) -> Result<()> {
    for (name, section) in cfg.jobs.iter() {
        if section.frequency == 0 {
            return Err(ExpflowError::ConfigError(format!(
                "section '{}' has frequency 0 (must be >= 1)",
                name
            )));
        }

        if section.synchronize.is_some() && section.running != RunningType::Chunk {
            return Err(ExpflowError::ConfigError(format!(
                "section '{}' sets `synchronize` but runs per {} (only chunk sections can synchronize)",
                name, section.running
            )));
        }

        let needs_dates = section.running != RunningType::Once;
        let needs_members = matches!(section.running, RunningType::Member | RunningType::Chunk);
        let needs_chunks = section.running == RunningType::Chunk;

        if needs_dates && axes.dates.is_empty() {
            return Err(ExpflowError::ConfigError(format!(
                "section '{}' runs per {} but [experiment].dates is empty",
                name, section.running
            )));
        }
        if needs_members && axes.members.is_empty() {
            return Err(ExpflowError::ConfigError(format!(
                "section '{}' runs per {} but [experiment].members is empty",
                name, section.running
            )));
        }
        if needs_chunks && axes.chunks.is_empty() {
            return Err(ExpflowError::ConfigError(format!(
                "section '{}' runs per chunk but [experiment].num_chunks is 0",
                name
            )));
        }
    }
    Ok(())
}

fn validate_wrappers(cfg: &RawExperimentConfig) -> Result<()> {
    for (name, wrapper) in cfg.wrappers.iter() {
        for section in wrapper.jobs.iter() {
            if !cfg.jobs.contains_key(section) {
                return Err(ExpflowError::ConfigError(format!(
                    "wrapper '{}' references unknown section '{}'",
                    name, section
                )));
            }
        }
    }
    Ok(())
}

/// Sections that depend on each other without any offset almost always
/// produce a cyclic job graph. The build reports the real cycle; this only
/// gives an early hint naming the sections.
fn warn_on_section_cycles(cfg: &RawExperimentConfig) {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.jobs.keys() {
        graph.add_node(name.as_str());
    }

    for (name, section) in cfg.jobs.iter() {
        for key in section.dependencies.keys() {
            let Ok(parsed) = parse_dependency_key(&key) else {
                continue;
            };
            if matches!(parsed.sign, Some(Sign::Minus | Sign::Plus)) || parsed.section == *name {
                continue;
            }
            if let Some((target, _)) = cfg.jobs.get_key_value(parsed.section.as_str()) {
                graph.add_edge(target.as_str(), name.as_str(), ());
            }
        }
    }

    if let Err(cycle) = toposort(&graph, None) {
        warn!(
            section = %cycle.node_id(),
            "sections depend on each other without offsets; the job graph may be cyclic"
        );
    }
}
