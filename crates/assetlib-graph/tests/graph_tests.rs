// Exercises the dependency graph through its public API the way the registry
// drives it: insert, persist edges as JSON, restore, and query.

use assetlib_core::AssetError;
use assetlib_graph::{Dependency, DependencyGraph, DependencyType, Severity};

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn edges_survive_json_round_trip() {
    let mut graph = DependencyGraph::new();
    graph
        .add_dependency("page", "button", "1.2.0", DependencyType::Required)
        .unwrap();
    graph
        .add_dependency("page", "tokens", "1.0.0", DependencyType::Peer)
        .unwrap();
    graph
        .add_dependency("button", "tokens", "1.0.0", DependencyType::Required)
        .unwrap();

    let json = serde_json::to_string(&graph.all_edges()).unwrap();
    assert!(json.contains("\"dependsOn\""));
    assert!(json.contains("\"type\":\"peer\""));

    let edges: Vec<Dependency> = serde_json::from_str(&json).unwrap();
    let restored = DependencyGraph::from_edges(edges);

    assert_eq!(restored.edge_count(), 3);
    assert_eq!(
        restored.topological_order(&ids(&["page"])).unwrap(),
        ids(&["tokens", "button", "page"])
    );
}

#[test]
fn dependents_follow_removal() {
    let mut graph = DependencyGraph::new();
    graph
        .add_dependency("a", "shared", "1.0.0", DependencyType::Required)
        .unwrap();
    graph
        .add_dependency("b", "shared", "1.0.0", DependencyType::Dev)
        .unwrap();

    assert_eq!(graph.get_dependents("shared", false), ids(&["a", "b"]));

    let removed = graph.remove_dependency("a", "shared").unwrap();
    assert_eq!(removed.dep_type, DependencyType::Required);
    assert!(removed.required);
    assert_eq!(graph.get_dependents("shared", false), ids(&["b"]));

    // The removed edge no longer blocks the reverse direction.
    graph
        .add_dependency("shared", "a", "1.0.0", DependencyType::Optional)
        .unwrap();
}

#[test]
fn conflicts_consider_only_direct_declarations() {
    // x -> m -> d@2.0 and x -> d@1.0; y -> d@1.0. x and y agree directly.
    let mut graph = DependencyGraph::new();
    graph
        .add_dependency("m", "d", "2.0", DependencyType::Required)
        .unwrap();
    graph
        .add_dependency("x", "m", "1.0", DependencyType::Required)
        .unwrap();
    graph
        .add_dependency("x", "d", "1.0", DependencyType::Required)
        .unwrap();
    graph
        .add_dependency("y", "d", "1.0", DependencyType::Required)
        .unwrap();

    assert!(graph.detect_conflicts(&ids(&["x", "y"])).is_empty());

    // m and y disagree on d.
    let conflicts = graph.detect_conflicts(&ids(&["m", "y"]));
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].severity, Severity::Error);
    assert_eq!(conflicts[0].asset_ids, ids(&["m", "y", "d"]));
}

#[test]
fn restored_cycle_is_reported_not_rejected() {
    let graph = DependencyGraph::from_edges(vec![
        Dependency::new("a", "b", "1.0.0", DependencyType::Required),
        Dependency::new("b", "c", "1.0.0", DependencyType::Required),
        Dependency::new("c", "a", "1.0.0", DependencyType::Required),
    ]);

    let cycle = graph.find_cycle("b").unwrap();
    assert_eq!(cycle.first(), cycle.last());
    assert_eq!(cycle.len(), 4);

    let conflicts = graph.detect_conflicts(&ids(&["a", "b", "c"]));
    assert_eq!(conflicts.len(), 1);
    assert!(conflicts[0].reason.contains("circular"));

    assert!(matches!(
        graph.topological_order(&ids(&["c"])),
        Err(AssetError::CircularDependency(_))
    ));
}
