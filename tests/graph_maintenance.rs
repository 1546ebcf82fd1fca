// tests/graph_maintenance.rs

mod common;

use expflow::dag::WorkflowGraph;
use expflow::errors::ExpflowError;
use expflow::job::{Coordinates, EdgeInfo, Job, JobKey, Status};
use expflow::types::RunningType;

/// Graph with one bare job per name. Jobs with a name starting with `d`
/// declare a dependency (and can therefore be pruned).
fn graph_of(names: &[&str]) -> WorkflowGraph {
    let mut graph = WorkflowGraph::new();
    for (i, name) in names.iter().enumerate() {
        let key = JobKey {
            section: "T".to_string(),
            coords: Coordinates {
                split: Some(i as u32 + 1),
                ..Coordinates::default()
            },
        };
        let mut job = Job::new(name.to_string(), &key, RunningType::Once);
        if name.starts_with('d') {
            job.dependencies = vec!["T".to_string()];
        }
        graph.add_or_update_node(job);
    }
    graph
}

fn plain() -> EdgeInfo {
    EdgeInfo::default()
}

fn special(status: Status) -> EdgeInfo {
    EdgeInfo {
        status,
        ..EdgeInfo::default()
    }
}

#[test]
fn add_edge_keeps_genealogy_in_sync() {
    let mut graph = graph_of(&["a", "b", "c"]);
    graph.add_edge("a", "b", plain()).unwrap();
    graph.add_edge("a", "c", special(Status::Running)).unwrap();

    let a = graph.get("a").unwrap();
    assert_eq!(a.children.iter().collect::<Vec<_>>(), vec!["b", "c"]);
    assert_eq!(graph.get("b").unwrap().parents.len(), 1);
    assert!(graph.get("b").unwrap().edge_info.is_empty());
    assert_eq!(graph.get("c").unwrap().edge_to("a").status, Status::Running);
    assert!(graph.get("c").unwrap().has_special_edges());

    let children: Vec<&str> = graph.children_of("a").iter().map(|j| j.name.as_str()).collect();
    assert_eq!(children, vec!["b", "c"]);
    let parents: Vec<&str> = graph.parents_of("c").iter().map(|j| j.name.as_str()).collect();
    assert_eq!(parents, vec!["a"]);
    assert!(graph.has_edge("a", "b"));
    assert!(!graph.has_edge("b", "a"));
}

#[test]
fn add_edge_to_unknown_job_fails() {
    let mut graph = graph_of(&["a"]);
    match graph.add_edge("a", "ghost", plain()) {
        Err(ExpflowError::JobNotFound(name)) => assert_eq!(name, "ghost"),
        other => panic!("expected JobNotFound, got {other:?}"),
    }
    assert!(matches!(graph.try_get("ghost"), Err(ExpflowError::JobNotFound(_))));
}

#[test]
fn self_edges_are_ignored() {
    let mut graph = graph_of(&["a"]);
    graph.add_edge("a", "a", plain()).unwrap();
    assert_eq!(graph.edge_count(), 0);
    assert!(graph.get("a").unwrap().parents.is_empty());
}

#[test]
fn repeated_edges_merge_conditions() {
    let mut graph = graph_of(&["a", "b"]);
    let weak_running = EdgeInfo {
        status: Status::Running,
        from_step: 2,
        optional: true,
    };
    graph.add_edge("a", "b", weak_running).unwrap();
    graph
        .add_edge(
            "a",
            "b",
            EdgeInfo {
                status: Status::Queuing,
                from_step: 1,
                optional: true,
            },
        )
        .unwrap();

    assert_eq!(graph.edge_count(), 1);
    let merged = graph.get("b").unwrap().edge_to("a");
    assert_eq!(merged.status, Status::Running);
    assert_eq!(merged.from_step, 2);
    assert!(merged.optional);
    assert_eq!(graph.get("a").unwrap().max_checkpoint_step, 2);

    graph.add_edge("a", "b", plain()).unwrap();
    let merged = graph.get("b").unwrap().edge_to("a");
    assert_eq!(merged.status, Status::Completed);
    assert!(!merged.optional);
    assert_eq!(merged.from_step, 2);
}

#[test]
fn edge_info_merge_rules() {
    let required = EdgeInfo::default();
    let optional = EdgeInfo {
        optional: true,
        ..EdgeInfo::default()
    };
    assert!(!required.merge(optional).optional);
    assert!(optional.merge(optional).optional);

    let running = special(Status::Running);
    assert_eq!(running.merge(required).status, Status::Completed);
    assert_eq!(special(Status::Queuing).merge(running).status, Status::Running);
    assert!(running.is_special());
    assert!(!required.is_special());
}

#[test]
fn transitive_reduction_drops_shortcut_edges() {
    let mut graph = graph_of(&["a", "b", "c", "d1"]);
    graph.add_edge("a", "b", plain()).unwrap();
    graph.add_edge("b", "c", plain()).unwrap();
    graph.add_edge("a", "c", plain()).unwrap();
    graph.add_edge("c", "d1", plain()).unwrap();
    graph.add_edge("a", "d1", plain()).unwrap();

    let removed = graph.transitive_reduction().unwrap();

    assert_eq!(removed, 2);
    let pairs: Vec<(String, String)> = graph
        .edges()
        .into_iter()
        .map(|(p, c, _)| (p, c))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "c".to_string()),
            ("c".to_string(), "d1".to_string()),
        ]
    );
    assert_eq!(graph.get("a").unwrap().children.len(), 1);
    assert!(graph.has_path("a", "d1"));
}

#[test]
fn special_edge_implied_by_a_plain_path_is_reduced() {
    let mut graph = graph_of(&["a", "b", "c"]);
    graph.add_edge("a", "b", plain()).unwrap();
    graph.add_edge("b", "c", plain()).unwrap();
    graph.add_edge("a", "c", special(Status::Running)).unwrap();

    assert_eq!(graph.transitive_reduction().unwrap(), 1);
    assert!(!graph.has_edge("a", "c"));
    let c = graph.get("c").unwrap();
    assert!(!c.has_special_edges());
    assert_eq!(c.parents.iter().collect::<Vec<_>>(), vec!["b"]);
    assert!(graph.has_path("a", "c"));
}

#[test]
fn special_edges_without_a_plain_alternative_survive_reduction() {
    let mut graph = graph_of(&["a", "b", "c", "d"]);
    graph.add_edge("a", "b", special(Status::Running)).unwrap();
    graph.add_edge("b", "c", plain()).unwrap();
    graph.add_edge("a", "c", special(Status::Queuing)).unwrap();
    graph.add_edge("c", "d", special(Status::Running)).unwrap();

    assert_eq!(graph.transitive_reduction().unwrap(), 0);
    assert_eq!(graph.get("c").unwrap().edge_to("a").status, Status::Queuing);
    assert_eq!(graph.get("d").unwrap().edge_to("c").status, Status::Running);
}

#[test]
fn special_edges_are_not_alternate_paths() {
    let mut graph = graph_of(&["a", "b", "c"]);
    graph.add_edge("a", "b", special(Status::Running)).unwrap();
    graph.add_edge("b", "c", plain()).unwrap();
    graph.add_edge("a", "c", plain()).unwrap();

    assert_eq!(graph.transitive_reduction().unwrap(), 0);
    assert!(graph.has_edge("a", "c"));
}

#[test]
fn cycles_are_reported() {
    let mut graph = graph_of(&["a", "b", "c"]);
    graph.add_edge("a", "b", plain()).unwrap();
    graph.add_edge("b", "c", plain()).unwrap();
    graph.add_edge("c", "a", plain()).unwrap();

    assert!(matches!(
        graph.transitive_reduction(),
        Err(ExpflowError::DagCycle(_))
    ));
}

#[test]
fn prune_edgeless_respects_dependencies_and_section_flag() {
    let mut graph = graph_of(&["a", "d1", "d2", "d3"]);
    graph.add_edge("a", "d2", plain()).unwrap();
    graph.get_mut("d3").unwrap().delete_when_edgeless = false;

    // No declared dependencies: kept.
    assert!(!graph.prune_edgeless("a"));
    // Declared dependencies but wired: kept.
    assert!(!graph.prune_edgeless("d2"));
    // Section keeps its edgeless instances.
    assert!(!graph.prune_edgeless("d3"));
    assert!(graph.prune_edgeless("d1"));
    assert!(!graph.contains("d1"));
    assert!(!graph.prune_edgeless("missing"));
}

#[test]
fn prune_all_edgeless_reports_removed_names() {
    let mut graph = graph_of(&["a", "d1", "d2"]);
    graph.add_edge("a", "d2", plain()).unwrap();

    assert_eq!(graph.prune_all_edgeless(), vec!["d1".to_string()]);
    assert_eq!(graph.len(), 2);
}

#[test]
fn remove_node_detaches_neighbours() {
    let mut graph = graph_of(&["a", "b", "c"]);
    graph.add_edge("a", "b", plain()).unwrap();
    graph.add_edge("b", "c", special(Status::Running)).unwrap();

    let removed = graph.remove_node("b").expect("b exists");
    assert_eq!(removed.name, "b");
    assert!(graph.get("a").unwrap().children.is_empty());
    let c = graph.get("c").unwrap();
    assert!(c.parents.is_empty());
    assert!(c.edge_info.is_empty());
    assert_eq!(graph.edge_count(), 0);
    assert!(graph.section_jobs("T").iter().all(|j| j.name != "b"));
    assert!(graph.remove_node("b").is_none());
}

#[test]
fn clear_parents_and_remove_edge() {
    let mut graph = graph_of(&["a", "b", "c"]);
    graph.add_edge("a", "c", plain()).unwrap();
    graph.add_edge("b", "c", special(Status::Queuing)).unwrap();

    assert!(graph.remove_edge("a", "c"));
    assert!(!graph.remove_edge("a", "c"));
    assert!(graph.get("a").unwrap().children.is_empty());

    assert_eq!(graph.clear_parents("c").unwrap(), 1);
    let c = graph.get("c").unwrap();
    assert!(c.parents.is_empty());
    assert!(c.edge_info.is_empty());
    assert!(graph.get("b").unwrap().children.is_empty());
    assert!(graph.clear_parents("ghost").is_err());
}

#[test]
fn update_node_keeps_edges_and_priority() {
    let mut graph = graph_of(&["a", "b"]);
    graph.add_edge("a", "b", plain()).unwrap();
    let priority = graph.get("b").unwrap().priority;

    let mut replacement = graph.get("b").unwrap().clone();
    replacement.parents.clear();
    replacement.priority = 99;
    replacement.status = Status::Ready;
    graph.add_or_update_node(replacement);

    let b = graph.get("b").unwrap();
    assert_eq!(b.status, Status::Ready);
    assert_eq!(b.priority, priority);
    assert!(b.parents.contains("a"));
}

#[test]
fn rebuild_genealogy_restores_adjacency() {
    let mut graph = graph_of(&["a", "b"]);
    graph.add_edge("a", "b", special(Status::Running)).unwrap();

    {
        let b = graph.get_mut("b").unwrap();
        b.parents.clear();
        b.edge_info.clear();
    }
    graph.rebuild_genealogy();

    let b = graph.get("b").unwrap();
    assert!(b.parents.contains("a"));
    assert_eq!(b.edge_to("a").status, Status::Running);
}

#[test]
fn status_queries() {
    let mut graph = graph_of(&["a", "b", "c"]);
    graph.get_mut("a").unwrap().status = Status::Completed;
    graph.get_mut("b").unwrap().status = Status::Failed;
    graph.get_mut("c").unwrap().status = Status::Skipped;

    assert_eq!(graph.completed_jobs().len(), 1);
    assert_eq!(graph.failed_jobs().len(), 1);
    assert_eq!(graph.jobs_by_status(Status::Skipped)[0].name, "c");
    assert!(graph.is_finished());

    let b = graph.get_mut("b").unwrap();
    b.retrials = 1;
    assert!(!graph.is_finished());
}
