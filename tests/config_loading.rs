// tests/config_loading.rs

mod common;

use std::fs;

use tempfile::tempdir;

use crate::common::config_from_toml;
use expflow::config::{
    DependenciesSpec, ExperimentConfig, load_and_validate, load_from_path, parse_str,
};
use expflow::dag::build_graph;
use expflow::errors::ExpflowError;
use expflow::types::{RetryDelay, RunningType, Synchronize};

const EXPERIMENT: &str = r#"
[experiment]
expid = "a000"
dates = ["20000101", "20000201"]
members = ["fc0", "fc1"]
num_chunks = 3

[config]
retrials = 2
delay_retry_time = "+10"

[jobs.INI]
running = "member"

[jobs.SIM]
running = "chunk"
dependencies = "INI SIM-1"
retrials = 0

[jobs.POST]
running = "chunk"
synchronize = "member"

[jobs.POST.dependencies.SIM]
STATUS = "RUNNING"
FROM_STEP = 2

[wrappers.vertical]
jobs = ["SIM", "POST"]
"#;

fn validate(src: &str) -> Result<ExperimentConfig, ExpflowError> {
    ExperimentConfig::try_from(parse_str(src)?)
}

fn assert_config_error(src: &str) {
    match validate(src) {
        Err(ExpflowError::ConfigError(_)) => {}
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn loads_a_valid_file_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Experiment.toml");
    fs::write(&path, EXPERIMENT).unwrap();

    let raw = load_from_path(&path).unwrap();
    assert_eq!(raw.jobs.len(), 3);

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.expid(), "a000");
    assert_eq!(cfg.axes.dates.len(), 2);
    assert_eq!(cfg.axes.members, vec!["fc0".to_string(), "fc1".to_string()]);
    assert_eq!(cfg.axes.chunks, vec![1, 2, 3]);
    assert_eq!(cfg.wrappers["vertical"].jobs.len(), 2);
}

#[test]
fn section_defaults_and_overrides() {
    let cfg = config_from_toml(EXPERIMENT);

    let ini = cfg.section("INI").unwrap();
    assert_eq!(ini.running, RunningType::Member);
    assert_eq!(ini.frequency, 1);
    assert_eq!(ini.splits, 0);
    assert!(ini.delete_when_edgeless);
    assert!(ini.dependencies.is_empty());
    assert_eq!(cfg.effective_retrials(ini), 2);
    assert_eq!(cfg.effective_delay_retry(ini), RetryDelay::Linear(10));

    let sim = cfg.section("SIM").unwrap();
    assert_eq!(cfg.effective_retrials(sim), 0);
    assert_eq!(sim.dependencies.keys(), vec!["INI".to_string(), "SIM-1".to_string()]);

    let post = cfg.section("POST").unwrap();
    assert_eq!(post.synchronize, Some(Synchronize::Member));
    assert!(matches!(post.dependencies, DependenciesSpec::Table(_)));
    assert_eq!(post.dependencies.keys(), vec!["SIM".to_string()]);
    assert!(post.dependencies.relationships_of("SIM").is_some());

    assert_eq!(cfg.config.cycle_interval_secs, 10);
    assert!(!cfg.config.remote_dependencies);
    assert_eq!(cfg.experiment.chunk_ini, 1);
}

#[test]
fn table_dependency_keys_come_back_sorted() {
    let cfg = config_from_toml(
        r#"
        [experiment]
        expid = "a000"

        [jobs.ZED]
        [jobs.ALPHA]

        [jobs.POST.dependencies.ZED]
        [jobs.POST.dependencies.ALPHA]
        STATUS = "RUNNING"
        "#,
    );
    let post = cfg.section("POST").unwrap();
    assert_eq!(post.dependencies.keys(), vec!["ALPHA".to_string(), "ZED".to_string()]);

    let listed = DependenciesSpec::Keys("ZED ALPHA".to_string());
    assert_eq!(listed.keys(), vec!["ZED".to_string(), "ALPHA".to_string()]);
}

#[test]
fn chunk_ini_shifts_the_chunk_range() {
    let cfg = config_from_toml(
        r#"
        [experiment]
        expid = "a000"
        dates = ["20000101"]
        members = ["fc0"]
        num_chunks = 4
        chunk_ini = 3

        [jobs.SIM]
        running = "chunk"
        "#,
    );
    assert_eq!(cfg.axes.chunks, vec![3, 4]);
}

#[test]
fn hour_and_minute_start_dates_keep_their_precision() {
    let cfg = config_from_toml(
        r#"
        [experiment]
        expid = "a000"
        dates = ["2000010112", "200001011230"]

        [jobs.A]
        running = "date"
        "#,
    );
    let rendered: Vec<String> = cfg.axes.dates.iter().map(|d| d.to_string()).collect();
    assert_eq!(rendered, vec!["2000010112".to_string(), "200001011230".to_string()]);
}

#[test]
fn negative_splits_mean_unsplit() {
    let cfg = config_from_toml(
        r#"
        [experiment]
        expid = "a000"
        dates = ["20000101"]
        members = ["fc0"]
        num_chunks = 2

        [jobs.SIM]
        running = "chunk"
        splits = -1
        "#,
    );
    let sim = cfg.section("SIM").unwrap();
    assert_eq!(sim.splits, -1);
    assert_eq!(sim.split_count(), 0);

    let (graph, _) = build_graph(&cfg).unwrap();
    let names: Vec<String> = graph.names().cloned().collect();
    assert_eq!(names, vec!["a000_20000101_fc0_1_SIM", "a000_20000101_fc0_2_SIM"]);
    assert!(graph.jobs().all(|j| j.split.is_none() && j.splits == 0));
}

#[test]
fn unknown_dependency_targets_are_accepted() {
    let cfg = config_from_toml(
        r#"
        [experiment]
        expid = "a000"

        [jobs.A]
        dependencies = "GHOST"
        "#,
    );
    assert_eq!(cfg.section("A").unwrap().dependencies.keys(), vec!["GHOST".to_string()]);
}

#[test]
fn missing_sections_are_rejected() {
    assert_config_error(
        r#"
        [experiment]
        expid = "a000"
        "#,
    );
}

#[test]
fn empty_expid_is_rejected() {
    assert_config_error(
        r#"
        [experiment]
        expid = "  "

        [jobs.A]
        "#,
    );
}

#[test]
fn zero_frequency_is_rejected() {
    assert_config_error(
        r#"
        [experiment]
        expid = "a000"

        [jobs.A]
        frequency = 0
        "#,
    );
}

#[test]
fn synchronize_requires_a_chunk_section() {
    assert_config_error(
        r#"
        [experiment]
        expid = "a000"
        dates = ["20000101"]
        members = ["fc0"]

        [jobs.A]
        running = "member"
        synchronize = "date"
        "#,
    );
}

#[test]
fn running_type_requires_its_axes() {
    assert_config_error(
        r#"
        [experiment]
        expid = "a000"

        [jobs.A]
        running = "date"
        "#,
    );
    assert_config_error(
        r#"
        [experiment]
        expid = "a000"
        dates = ["20000101"]

        [jobs.A]
        running = "member"
        "#,
    );
    assert_config_error(
        r#"
        [experiment]
        expid = "a000"
        dates = ["20000101"]
        members = ["fc0"]

        [jobs.A]
        running = "chunk"
        "#,
    );
}

#[test]
fn wrappers_must_name_known_sections() {
    assert_config_error(
        r#"
        [experiment]
        expid = "a000"

        [jobs.A]

        [wrappers.w]
        jobs = ["A", "MISSING"]
        "#,
    );
}

#[test]
fn malformed_start_dates_are_rejected() {
    assert_config_error(
        r#"
        [experiment]
        expid = "a000"
        dates = ["2000-01-01"]

        [jobs.A]
        "#,
    );
    assert_config_error(
        r#"
        [experiment]
        expid = "a000"
        dates = ["20001301"]

        [jobs.A]
        "#,
    );
}

#[test]
fn bad_retry_delay_is_a_parse_error() {
    let result = parse_str(
        r#"
        [experiment]
        expid = "a000"

        [config]
        delay_retry_time = "soon"

        [jobs.A]
        "#,
    );
    assert!(matches!(result, Err(ExpflowError::TomlError(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let result = load_and_validate(dir.path().join("nope.toml"));
    assert!(matches!(result, Err(ExpflowError::IoError(_))));
}

#[test]
fn invalid_toml_is_a_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Experiment.toml");
    fs::write(&path, "[experiment\nexpid = ").unwrap();
    assert!(matches!(load_from_path(&path), Err(ExpflowError::TomlError(_))));
}
