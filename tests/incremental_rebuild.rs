// tests/incremental_rebuild.rs

mod common;

use std::collections::BTreeSet;

use crate::common::{ExperimentConfigBuilder, SectionBuilder, init_tracing, job};
use expflow::config::{ExperimentConfig, diff_configs};
use expflow::dag::{WorkflowGraph, build_graph, rebuild_graph};
use expflow::job::Status;

fn base() -> ExperimentConfigBuilder {
    ExperimentConfigBuilder::new()
        .chunks(2)
        .with_section("A", SectionBuilder::once().build())
        .with_section("B", SectionBuilder::chunk().deps("A B-1").build())
}

fn b(chunk: &str) -> String {
    job(&["20000101", "fc0", chunk], "B")
}

fn sections(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Build from `previous` with some progress, then rebuild against `current`.
fn progressed_rebuild(
    previous: &ExperimentConfig,
    current: &ExperimentConfig,
) -> (WorkflowGraph, expflow::dag::BuildOutcome) {
    let (mut graph, _) = build_graph(previous).unwrap();
    graph.get_mut("a000_A").unwrap().status = Status::Completed;
    graph.get_mut(&b("1")).unwrap().status = Status::Completed;
    graph.get_mut(&b("2")).unwrap().status = Status::Ready;
    let outcome = rebuild_graph(&mut graph, previous, current).unwrap();
    (graph, outcome)
}

fn assert_same_edges_as_full_build(graph: &WorkflowGraph, config: &ExperimentConfig) {
    let (full, _) = build_graph(config).unwrap();
    assert_eq!(graph.edges(), full.edges());
    let names: Vec<_> = graph.names().cloned().collect();
    let full_names: Vec<_> = full.names().cloned().collect();
    assert_eq!(names, full_names);
}

#[test]
fn added_section_is_the_only_one_rewired() {
    init_tracing();
    let previous = base().build();
    let current = base()
        .with_section("C", SectionBuilder::once().deps("B").build())
        .build();

    let (graph, outcome) = progressed_rebuild(&previous, &current);

    assert_eq!(outcome.rewired, sections(&["C"]));
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.reused, 3);
    assert!(outcome.removed.is_empty());

    assert_eq!(graph.get("a000_A").unwrap().status, Status::Completed);
    assert_eq!(graph.get(&b("1")).unwrap().status, Status::Completed);
    assert_eq!(graph.get(&b("2")).unwrap().status, Status::Waiting);
    assert!(graph.has_edge(&b("2"), "a000_C"));
    assert_same_edges_as_full_build(&graph, &current);
}

#[test]
fn modified_section_rewires_its_dependents() {
    let previous = base().build();
    let current = ExperimentConfigBuilder::new()
        .chunks(2)
        .with_section("A", SectionBuilder::once().retrials(2).build())
        .with_section("B", SectionBuilder::chunk().deps("A B-1").build())
        .build();

    let (graph, outcome) = progressed_rebuild(&previous, &current);

    assert_eq!(outcome.rewired, sections(&["A", "B"]));
    assert_eq!(outcome.created, 0);
    assert_eq!(graph.get("a000_A").unwrap().retrials, 2);
    assert_eq!(graph.get("a000_A").unwrap().status, Status::Completed);
    assert_same_edges_as_full_build(&graph, &current);
}

#[test]
fn unrelated_sections_keep_their_edges() {
    let previous = base()
        .with_section("X", SectionBuilder::once().build())
        .with_section("Y", SectionBuilder::once().deps("X").build())
        .build();
    let current = base()
        .with_section("X", SectionBuilder::once().skippable(true).build())
        .with_section("Y", SectionBuilder::once().deps("X").build())
        .build();

    let (graph, outcome) = progressed_rebuild(&previous, &current);

    assert_eq!(outcome.rewired, sections(&["X", "Y"]));
    assert!(graph.has_edge("a000_X", "a000_Y"));
    assert!(graph.has_edge(&b("1"), &b("2")));
    assert_same_edges_as_full_build(&graph, &current);
}

#[test]
fn removed_section_drops_its_jobs() {
    let previous = base()
        .with_section("C", SectionBuilder::once().deps("B").build())
        .build();
    let current = base().build();

    let (graph, outcome) = progressed_rebuild(&previous, &current);

    assert_eq!(outcome.removed, vec!["a000_C".to_string()]);
    assert!(outcome.rewired.is_empty());
    assert!(!graph.contains("a000_C"));
    assert!(graph.get(&b("2")).unwrap().children.is_empty());
    assert_same_edges_as_full_build(&graph, &current);
}

#[test]
fn axis_change_rewires_everything() {
    let previous = base().build();
    let current = base().members(&["fc0", "fc1"]).build();

    let (graph, outcome) = progressed_rebuild(&previous, &current);

    assert_eq!(outcome.rewired, sections(&["A", "B"]));
    assert_eq!(outcome.created, 2);
    assert_eq!(graph.get(&b("1")).unwrap().status, Status::Completed);
    assert!(graph.contains(&job(&["20000101", "fc1", "2"], "B")));
    assert_same_edges_as_full_build(&graph, &current);
}

#[test]
fn shrinking_the_chunk_range_removes_instances() {
    let previous = base().chunks(3).build();
    let current = base().build();

    let (graph, outcome) = progressed_rebuild(&previous, &current);

    assert_eq!(outcome.removed, vec![b("3")]);
    assert!(!graph.contains(&b("3")));
    assert_same_edges_as_full_build(&graph, &current);
}

#[test]
fn unchanged_config_is_a_no_op() {
    let config = base().build();
    let (graph, outcome) = progressed_rebuild(&config, &config);

    assert!(outcome.rewired.is_empty());
    assert!(outcome.removed.is_empty());
    assert_eq!(outcome.edges_wired, 0);
    assert_eq!(outcome.edges_reduced, 0);
    assert_same_edges_as_full_build(&graph, &config);
}

#[test]
fn diff_reports_added_removed_and_modified_sections() {
    let previous = base()
        .with_section("OLD", SectionBuilder::once().build())
        .build();
    let current = ExperimentConfigBuilder::new()
        .chunks(2)
        .with_section("A", SectionBuilder::once().build())
        .with_section("B", SectionBuilder::chunk().deps("A").build())
        .with_section("NEW", SectionBuilder::once().build())
        .build();

    let diff = diff_configs(&previous, &current);
    assert!(!diff.axes_changed);
    assert_eq!(diff.added, sections(&["NEW"]));
    assert_eq!(diff.removed, sections(&["OLD"]));
    assert_eq!(diff.modified, sections(&["B"]));
    assert_eq!(diff.changed(), sections(&["B", "NEW"]));
    assert!(diff_configs(&current, &current).is_empty());
}

#[test]
fn retry_defaults_touch_sections_without_overrides() {
    let previous = ExperimentConfigBuilder::new()
        .with_section("A", SectionBuilder::once().build())
        .with_section(
            "B",
            SectionBuilder::once()
                .retrials(1)
                .delay_retry("5")
                .build(),
        )
        .build();
    let current = ExperimentConfigBuilder::new()
        .retrials(3)
        .with_section("A", SectionBuilder::once().build())
        .with_section(
            "B",
            SectionBuilder::once()
                .retrials(1)
                .delay_retry("5")
                .build(),
        )
        .build();

    let diff = diff_configs(&previous, &current);
    assert_eq!(diff.modified, sections(&["A"]));
    assert!(!diff.axes_changed);
}

#[test]
fn expid_change_counts_as_an_axis_change() {
    let previous = base().build();
    let current = base().expid("a001").build();
    assert!(diff_configs(&previous, &current).axes_changed);
}
