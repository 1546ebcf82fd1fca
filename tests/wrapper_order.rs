// tests/wrapper_order.rs

mod common;

use crate::common::{ExperimentConfigBuilder, SectionBuilder, job};
use expflow::config::ExperimentConfig;
use expflow::dag::build_graph;
use expflow::errors::ExpflowError;
use expflow::types::RunningType;
use expflow::wrapper::WrapperOrderer;

fn wrapped_config() -> ExperimentConfig {
    ExperimentConfigBuilder::new()
        .members(&["fc0", "fc1"])
        .chunks(2)
        .with_section("SIM", SectionBuilder::chunk().build())
        .with_section("POST", SectionBuilder::chunk().deps("SIM").build())
        .with_section("CLEAN", SectionBuilder::once().deps("POST").build())
        .with_wrapper("vertical", &["SIM", "POST", "CLEAN"])
        .build()
}

#[test]
fn chunks_interleave_sections_per_member() {
    let cfg = wrapped_config();
    let (graph, _) = build_graph(&cfg).unwrap();

    let groups = WrapperOrderer::new(&cfg)
        .order_wrapper(&graph, "vertical")
        .unwrap();
    assert_eq!(groups.len(), 2);

    let fc0 = &groups[0];
    assert_eq!(fc0.member.as_deref(), Some("fc0"));
    assert_eq!(fc0.date.map(|d| d.to_string()).as_deref(), Some("20000101"));
    let names: Vec<&str> = fc0.job_names().iter().map(|n| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            job(&["20000101", "fc0", "1"], "SIM"),
            job(&["20000101", "fc0", "1"], "POST"),
            job(&["20000101", "fc0", "2"], "SIM"),
            job(&["20000101", "fc0", "2"], "POST"),
        ]
    );
    assert_eq!(fc0.runs.len(), 1);
}

#[test]
fn once_jobs_land_in_the_last_group() {
    let cfg = wrapped_config();
    let (graph, _) = build_graph(&cfg).unwrap();

    let groups = WrapperOrderer::new(&cfg)
        .order_wrapper(&graph, "vertical")
        .unwrap();
    let fc1 = &groups[1];
    assert_eq!(fc1.member.as_deref(), Some("fc1"));

    let names: Vec<String> = fc1.job_names().into_iter().cloned().collect();
    assert_eq!(
        names,
        vec![
            job(&["20000101", "fc1", "1"], "SIM"),
            job(&["20000101", "fc1", "1"], "POST"),
            job(&["20000101", "fc1", "2"], "SIM"),
            job(&["20000101", "fc1", "2"], "POST"),
            "a000_CLEAN".to_string(),
        ]
    );

    assert_eq!(fc1.runs.len(), 2);
    assert_eq!(fc1.runs[0].running, RunningType::Chunk);
    assert_eq!(fc1.runs[1].running, RunningType::Once);
    assert_eq!(fc1.runs[1].jobs, vec!["a000_CLEAN".to_string()]);

    assert!(
        groups[0]
            .job_names()
            .iter()
            .all(|name| name.as_str() != "a000_CLEAN")
    );
}

#[test]
fn section_order_breaks_ties_within_a_chunk() {
    let cfg = ExperimentConfigBuilder::new()
        .chunks(1)
        .with_section("SIM", SectionBuilder::chunk().build())
        .with_section("POST", SectionBuilder::chunk().deps("SIM").build())
        .with_wrapper("reversed", &["POST", "SIM"])
        .build();
    let (graph, _) = build_graph(&cfg).unwrap();

    let groups = WrapperOrderer::new(&cfg)
        .order_wrapper(&graph, "reversed")
        .unwrap();
    let names: Vec<String> = groups[0].job_names().into_iter().cloned().collect();
    assert_eq!(
        names,
        vec![
            job(&["20000101", "fc0", "1"], "POST"),
            job(&["20000101", "fc0", "1"], "SIM"),
        ]
    );
}

#[test]
fn groups_follow_date_then_member_order() {
    let cfg = ExperimentConfigBuilder::new()
        .dates(&["20000101", "20000201"])
        .members(&["fc0", "fc1"])
        .chunks(1)
        .with_section("SIM", SectionBuilder::chunk().build())
        .with_wrapper("w", &["SIM"])
        .build();
    let (graph, _) = build_graph(&cfg).unwrap();

    let orders = WrapperOrderer::new(&cfg).order_all(&graph);
    let groups = &orders["w"];
    let keys: Vec<(String, String)> = groups
        .iter()
        .map(|g| {
            (
                g.date.map(|d| d.to_string()).unwrap_or_default(),
                g.member.clone().unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(
        keys,
        vec![
            ("20000101".to_string(), "fc0".to_string()),
            ("20000101".to_string(), "fc1".to_string()),
            ("20000201".to_string(), "fc0".to_string()),
            ("20000201".to_string(), "fc1".to_string()),
        ]
    );
}

#[test]
fn unknown_wrapper_is_a_config_error() {
    let cfg = wrapped_config();
    let (graph, _) = build_graph(&cfg).unwrap();

    assert!(matches!(
        WrapperOrderer::new(&cfg).order_wrapper(&graph, "missing"),
        Err(ExpflowError::ConfigError(_))
    ));
}

#[test]
fn no_wrappers_means_no_orders() {
    let cfg = ExperimentConfigBuilder::new()
        .with_section("A", SectionBuilder::once().build())
        .build();
    let (graph, _) = build_graph(&cfg).unwrap();

    assert!(WrapperOrderer::new(&cfg).order_all(&graph).is_empty());
    let sections = vec!["A".to_string()];
    let groups = WrapperOrderer::new(&cfg).order_sections(&graph, &sections);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].job_names(), vec![&"a000_A".to_string()]);
}
