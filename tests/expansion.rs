// tests/expansion.rs

mod common;

use crate::common::{ExperimentConfigBuilder, SectionBuilder, job, t0};
use expflow::dag::WorkflowGraph;
use expflow::job::{JobInstanceExpander, Selection, StartDate, Status};
use expflow::types::Synchronize;
use proptest::prelude::*;

fn expand(cfg: &expflow::config::ExperimentConfig) -> WorkflowGraph {
    let mut graph = WorkflowGraph::new();
    JobInstanceExpander::new(cfg)
        .expand_all(&mut graph)
        .expect("expansion succeeds");
    graph
}

fn section_names(graph: &WorkflowGraph, section: &str) -> Vec<String> {
    graph
        .section_jobs(section)
        .iter()
        .map(|j| j.name.clone())
        .collect()
}

#[test]
fn chunk_section_expands_over_every_axis() {
    let cfg = ExperimentConfigBuilder::new()
        .dates(&["20000101", "20000201"])
        .members(&["fc0", "fc1"])
        .chunks(2)
        .with_section("SIM", SectionBuilder::chunk().build())
        .build();
    let graph = expand(&cfg);

    assert_eq!(graph.len(), 8);
    let sim = graph.get(&job(&["20000201", "fc1", "2"], "SIM")).unwrap();
    assert_eq!(sim.chunk, Some(2));
    assert_eq!(sim.member.as_deref(), Some("fc1"));
    assert_eq!(sim.split, None);
    assert_eq!(sim.status, Status::Waiting);
}

#[test]
fn job_names_follow_coordinate_order() {
    let cfg = ExperimentConfigBuilder::new()
        .chunks(1)
        .with_section("INI", SectionBuilder::once().build())
        .with_section("LOCAL", SectionBuilder::date().build())
        .with_section("PREP", SectionBuilder::member().build())
        .with_section("SIM", SectionBuilder::chunk().splits(2).build())
        .build();
    let graph = expand(&cfg);

    assert_eq!(section_names(&graph, "INI"), vec!["a000_INI"]);
    assert_eq!(section_names(&graph, "LOCAL"), vec!["a000_20000101_LOCAL"]);
    assert_eq!(section_names(&graph, "PREP"), vec!["a000_20000101_fc0_PREP"]);
    assert_eq!(
        section_names(&graph, "SIM"),
        vec!["a000_20000101_fc0_1_1_SIM", "a000_20000101_fc0_1_2_SIM"]
    );
}

#[test]
fn frequency_keeps_every_nth_chunk_and_the_last() {
    let cfg = ExperimentConfigBuilder::new()
        .chunks(5)
        .with_section("POST", SectionBuilder::chunk().frequency(2).build())
        .build();
    let graph = expand(&cfg);

    let chunks: Vec<u32> = graph
        .section_jobs("POST")
        .iter()
        .filter_map(|j| j.chunk)
        .collect();
    assert_eq!(chunks, vec![2, 4, 5]);
}

#[test]
fn frequency_thins_dates_and_members() {
    let cfg = ExperimentConfigBuilder::new()
        .dates(&["20000101", "20000201", "20000301"])
        .members(&["fc0", "fc1", "fc2"])
        .with_section("LOCAL", SectionBuilder::date().frequency(2).build())
        .with_section("PREP", SectionBuilder::member().frequency(2).build())
        .build();
    let graph = expand(&cfg);

    assert_eq!(
        section_names(&graph, "LOCAL"),
        vec!["a000_20000201_LOCAL", "a000_20000301_LOCAL"]
    );

    let prep = graph.section_jobs("PREP");
    assert_eq!(prep.len(), 6);
    assert!(prep.iter().all(|j| j.member.as_deref() != Some("fc0")));
}

#[test]
fn section_delay_drops_early_chunks() {
    let cfg = ExperimentConfigBuilder::new()
        .chunks(4)
        .with_section("POST", SectionBuilder::chunk().delay(2).build())
        .build();
    let graph = expand(&cfg);

    let chunks: Vec<u32> = graph
        .section_jobs("POST")
        .iter()
        .filter_map(|j| j.chunk)
        .collect();
    assert_eq!(chunks, vec![3, 4]);
}

#[test]
fn member_synchronized_section_has_no_member() {
    let cfg = ExperimentConfigBuilder::new()
        .dates(&["20000101", "20000201"])
        .members(&["fc0", "fc1"])
        .chunks(2)
        .with_section(
            "SYNC",
            SectionBuilder::chunk().synchronize(Synchronize::Member).build(),
        )
        .build();
    let graph = expand(&cfg);

    let names = section_names(&graph, "SYNC");
    assert_eq!(
        names,
        vec![
            "a000_20000101_1_SYNC",
            "a000_20000101_2_SYNC",
            "a000_20000201_1_SYNC",
            "a000_20000201_2_SYNC",
        ]
    );
    assert!(graph.section_jobs("SYNC").iter().all(|j| j.member.is_none()));
}

#[test]
fn date_synchronized_section_is_one_per_chunk() {
    let cfg = ExperimentConfigBuilder::new()
        .dates(&["20000101", "20000201"])
        .members(&["fc0", "fc1"])
        .chunks(3)
        .with_section(
            "SYNC",
            SectionBuilder::chunk().synchronize(Synchronize::Date).build(),
        )
        .build();
    let graph = expand(&cfg);

    assert_eq!(
        section_names(&graph, "SYNC"),
        vec!["a000_1_SYNC", "a000_2_SYNC", "a000_3_SYNC"]
    );
    let first = graph.get("a000_1_SYNC").unwrap();
    assert_eq!(first.date, None);
    assert_eq!(first.member, None);
    assert_eq!(first.synchronize, Some(Synchronize::Date));
}

#[test]
fn splits_multiply_instances() {
    let cfg = ExperimentConfigBuilder::new()
        .with_section("A", SectionBuilder::once().splits(3).build())
        .build();
    let graph = expand(&cfg);

    assert_eq!(section_names(&graph, "A"), vec!["a000_1_A", "a000_2_A", "a000_3_A"]);
    assert!(graph.section_jobs("A").iter().all(|j| j.splits == 3));
}

#[test]
fn section_attributes_are_copied_onto_instances() {
    let cfg = ExperimentConfigBuilder::new()
        .chunks(1)
        .retrials(2)
        .delay_retry("+10")
        .with_section(
            "SIM",
            SectionBuilder::chunk()
                .deps("SIM-1")
                .skippable(true)
                .delete_when_edgeless(false)
                .build(),
        )
        .with_section("POST", SectionBuilder::chunk().retrials(5).build())
        .build();
    let graph = expand(&cfg);

    let sim = graph.get(&job(&["20000101", "fc0", "1"], "SIM")).unwrap();
    assert_eq!(sim.retrials, 2);
    assert_eq!(sim.delay_retry.to_string(), "+10");
    assert_eq!(sim.dependencies, vec!["SIM-1".to_string()]);
    assert!(sim.skippable);
    assert!(!sim.delete_when_edgeless);

    let post = graph.get(&job(&["20000101", "fc0", "1"], "POST")).unwrap();
    assert_eq!(post.retrials, 5);
}

#[test]
fn second_expansion_reuses_existing_jobs() {
    let cfg = ExperimentConfigBuilder::new()
        .members(&["fc0", "fc1"])
        .chunks(2)
        .with_section("SIM", SectionBuilder::chunk().build())
        .build();
    let mut graph = WorkflowGraph::new();
    let expander = JobInstanceExpander::new(&cfg);

    let first = expander.expand_all(&mut graph).unwrap();
    assert_eq!((first.created, first.reused), (4, 0));

    let second = expander.expand_all(&mut graph).unwrap();
    assert_eq!((second.created, second.reused), (0, 4));
    assert_eq!(graph.len(), 4);
}

#[test]
fn reuse_resets_pre_run_statuses_only() {
    let cfg = ExperimentConfigBuilder::new()
        .chunks(3)
        .with_section("SIM", SectionBuilder::chunk().build())
        .build();
    let mut graph = expand(&cfg);

    let c1 = job(&["20000101", "fc0", "1"], "SIM");
    let c2 = job(&["20000101", "fc0", "2"], "SIM");
    let c3 = job(&["20000101", "fc0", "3"], "SIM");
    graph.get_mut(&c1).unwrap().status = Status::Running;
    {
        let delayed = graph.get_mut(&c2).unwrap();
        delayed.status = Status::Delayed;
        delayed.delay_end = Some(t0());
    }
    {
        let prepared = graph.get_mut(&c3).unwrap();
        prepared.status = Status::Prepared;
        prepared.hold = true;
    }

    JobInstanceExpander::new(&cfg).expand_all(&mut graph).unwrap();

    assert_eq!(graph.get(&c1).unwrap().status, Status::Running);
    let c2 = graph.get(&c2).unwrap();
    assert_eq!(c2.status, Status::Waiting);
    assert_eq!(c2.delay_end, None);
    let c3 = graph.get(&c3).unwrap();
    assert_eq!(c3.status, Status::Waiting);
    assert!(!c3.hold);
}

#[test]
fn priorities_follow_creation_order() {
    let cfg = ExperimentConfigBuilder::new()
        .chunks(3)
        .with_section("SIM", SectionBuilder::chunk().build())
        .build();
    let graph = expand(&cfg);

    let priorities: Vec<u32> = graph.section_jobs("SIM").iter().map(|j| j.priority).collect();
    let mut sorted = priorities.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(priorities, sorted);
    assert_eq!(priorities.len(), 3);
}

#[test]
fn select_filters_given_axes_only() {
    let cfg = ExperimentConfigBuilder::new()
        .dates(&["20000101", "20000201"])
        .members(&["fc0", "fc1"])
        .chunks(3)
        .with_section("SIM", SectionBuilder::chunk().build())
        .with_section("INI", SectionBuilder::once().build())
        .build();
    let graph = expand(&cfg);

    let one = graph.select("SIM", &Selection::all().member("fc1").chunk(2));
    assert_eq!(one.len(), 2);
    assert!(one.iter().all(|j| j.member.as_deref() == Some("fc1") && j.chunk == Some(2)));

    let date: StartDate = "20000201".parse().unwrap();
    let exact = graph.select("SIM", &Selection::all().date(date).member("fc0").chunk(3));
    let names: Vec<&str> = exact.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["a000_20000201_fc0_3_SIM"]);

    // A once job does not vary along any axis, so it matches any selection.
    assert_eq!(graph.select("INI", &Selection::all().member("fc1")).len(), 1);
    assert!(graph.select("MISSING", &Selection::all()).is_empty());
}

fn date_list(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("20000{i}01")).collect()
}

proptest! {
    #[test]
    fn frequency_count_is_ceiling(
        chunks in 1u32..12,
        frequency in 1u32..6,
        dates in 1usize..4,
        members in 1usize..4,
    ) {
        let date_strings = date_list(dates);
        let date_refs: Vec<&str> = date_strings.iter().map(String::as_str).collect();
        let member_strings: Vec<String> = (0..members).map(|i| format!("fc{i}")).collect();
        let member_refs: Vec<&str> = member_strings.iter().map(String::as_str).collect();

        let cfg = ExperimentConfigBuilder::new()
            .dates(&date_refs)
            .members(&member_refs)
            .chunks(chunks)
            .with_section("POST", SectionBuilder::chunk().frequency(frequency).build())
            .build();
        let graph = expand(&cfg);

        let expected = chunks.div_ceil(frequency) as usize * dates * members;
        prop_assert_eq!(graph.section_jobs("POST").len(), expected);
        let last = graph
            .section_jobs("POST")
            .iter()
            .filter(|j| j.chunk == Some(chunks))
            .count();
        prop_assert_eq!(last, dates * members);
    }
}
