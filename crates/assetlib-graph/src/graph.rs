use crate::traversal::{breadth_first, DependencyTree, GraphNode};
use crate::{Conflict, Dependency, DependencyType, Severity};
use assetlib_core::{Asset, AssetError, AssetId, Result};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Per-asset adjacency lists plus the reverse index used for dependents.
///
/// The graph is kept acyclic at insertion time: an edge `from -> to` is
/// refused when `from` is already reachable from `to`.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    edges: HashMap<AssetId, Vec<Dependency>>,
    reverse: HashMap<AssetId, BTreeSet<AssetId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from persisted edges without re-checking for cycles,
    /// so a corrupted store still loads and shows up in conflict detection.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = Dependency>,
    {
        let mut graph = Self::new();
        for dep in edges {
            graph.insert_edge(dep);
        }
        graph
    }

    /// Returns `Ok(false)` when the edge already exists.
    pub fn add_dependency(
        &mut self,
        from: &str,
        to: &str,
        version: &str,
        dep_type: DependencyType,
    ) -> Result<bool> {
        self.add(Dependency::new(from, to, version, dep_type))
    }

    pub fn add(&mut self, dep: Dependency) -> Result<bool> {
        if self.has_edge(&dep.asset_id, &dep.depends_on) {
            debug!(from = %dep.asset_id, to = %dep.depends_on, "dependency already present");
            return Ok(false);
        }

        if self.would_create_cycle(&dep.asset_id, &dep.depends_on) {
            return Err(AssetError::CircularDependency(format!(
                "{} -> {} would close a cycle",
                dep.asset_id, dep.depends_on
            )));
        }

        debug!(from = %dep.asset_id, to = %dep.depends_on, version = %dep.version, "dependency added");
        self.insert_edge(dep);
        Ok(true)
    }

    fn insert_edge(&mut self, dep: Dependency) {
        self.reverse
            .entry(dep.depends_on.clone())
            .or_default()
            .insert(dep.asset_id.clone());
        self.edges.entry(dep.asset_id.clone()).or_default().push(dep);
    }

    pub fn would_create_cycle(&self, from: &str, to: &str) -> bool {
        from == to || self.transitive_closure(to).contains(from)
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges
            .get(from)
            .map(|deps| deps.iter().any(|d| d.depends_on == to))
            .unwrap_or(false)
    }

    pub fn remove_dependency(&mut self, from: &str, to: &str) -> Option<Dependency> {
        let deps = self.edges.get_mut(from)?;
        let pos = deps.iter().position(|d| d.depends_on == to)?;
        let removed = deps.remove(pos);
        if deps.is_empty() {
            self.edges.remove(from);
        }
        if let Some(parents) = self.reverse.get_mut(to) {
            parents.remove(from);
            if parents.is_empty() {
                self.reverse.remove(to);
            }
        }
        Some(removed)
    }

    /// Drop every edge touching `id`, in either direction.
    pub fn remove_asset(&mut self, id: &str) -> Vec<Dependency> {
        let mut removed = Vec::new();

        let targets: Vec<AssetId> = self
            .edges
            .get(id)
            .map(|deps| deps.iter().map(|d| d.depends_on.clone()).collect())
            .unwrap_or_default();
        for to in targets {
            removed.extend(self.remove_dependency(id, &to));
        }

        let parents: Vec<AssetId> = self
            .reverse
            .get(id)
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default();
        for from in parents {
            removed.extend(self.remove_dependency(&from, id));
        }

        removed
    }

    pub fn dependency_edges(&self, id: &str) -> &[Dependency] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_edges(&self) -> Vec<Dependency> {
        let mut all: Vec<Dependency> = self.edges.values().flatten().cloned().collect();
        all.sort_by(|a, b| (&a.asset_id, &a.depends_on).cmp(&(&b.asset_id, &b.depends_on)));
        all
    }

    /// Version string `from` declares for `to`, if it depends on it directly.
    pub fn direct_version(&self, from: &str, to: &str) -> Option<&Dependency> {
        self.edges
            .get(from)
            .and_then(|deps| deps.iter().find(|d| d.depends_on == to))
    }

    fn direct_targets(&self, id: &str) -> Vec<AssetId> {
        self.dependency_edges(id)
            .iter()
            .map(|d| d.depends_on.clone())
            .collect()
    }

    fn direct_parents(&self, id: &str) -> Vec<AssetId> {
        self.reverse
            .get(id)
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_dependencies(&self, id: &str, transitive: bool) -> Vec<AssetId> {
        if transitive {
            breadth_first(id, |n| self.direct_targets(n))
        } else {
            self.direct_targets(id)
        }
    }

    pub fn get_dependents(&self, id: &str, transitive: bool) -> Vec<AssetId> {
        if transitive {
            breadth_first(id, |n| self.direct_parents(n))
        } else {
            self.direct_parents(id)
        }
    }

    pub fn transitive_closure(&self, id: &str) -> HashSet<AssetId> {
        self.get_dependencies(id, true).into_iter().collect()
    }

    /// Depth-first materialization of the subgraph under `root`.
    pub fn build_graph(&self, root: &str) -> DependencyTree {
        let mut tree = DependencyTree {
            root: root.to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
        };
        let mut visited = HashSet::new();
        self.build_visit(root, 0, &mut visited, &mut tree);
        tree
    }

    fn build_visit(
        &self,
        id: &str,
        depth: usize,
        visited: &mut HashSet<AssetId>,
        tree: &mut DependencyTree,
    ) {
        if !visited.insert(id.to_string()) {
            return;
        }
        tree.nodes.push(GraphNode {
            id: id.to_string(),
            depth,
        });

        for dep in self.dependency_edges(id) {
            tree.edges.push((id.to_string(), dep.depends_on.clone()));
            self.build_visit(&dep.depends_on, depth + 1, visited, tree);
        }
    }

    /// Tri-color DFS from `start`. Returns the ids on the first cycle found,
    /// starting and ending at the same id.
    pub fn find_cycle(&self, start: &str) -> Option<Vec<AssetId>> {
        let mut marks = HashMap::new();
        let mut stack = Vec::new();
        self.cycle_visit(start, &mut marks, &mut stack)
    }

    fn cycle_visit(
        &self,
        id: &str,
        marks: &mut HashMap<AssetId, Mark>,
        stack: &mut Vec<AssetId>,
    ) -> Option<Vec<AssetId>> {
        match marks.get(id) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let pos = stack.iter().position(|s| s == id)?;
                let mut cycle = stack[pos..].to_vec();
                cycle.push(id.to_string());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(id.to_string(), Mark::Visiting);
        stack.push(id.to_string());

        for dep in self.dependency_edges(id) {
            if let Some(cycle) = self.cycle_visit(&dep.depends_on, marks, stack) {
                return Some(cycle);
            }
        }

        stack.pop();
        marks.insert(id.to_string(), Mark::Done);
        None
    }

    pub fn has_cycle(&self) -> bool {
        let mut marks = HashMap::new();
        let mut starts: Vec<&AssetId> = self.edges.keys().collect();
        starts.sort();
        starts.into_iter().any(|id| {
            let mut stack = Vec::new();
            self.cycle_visit(id, &mut marks, &mut stack).is_some()
        })
    }

    /// Version disagreements between every pair of `ids` over their shared
    /// transitive dependencies, plus any cycle an id participates in.
    pub fn detect_conflicts(&self, ids: &[AssetId]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        let closures: Vec<HashSet<AssetId>> =
            ids.iter().map(|id| self.transitive_closure(id)).collect();

        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let (a, b) = (&ids[i], &ids[j]);
                let mut shared: Vec<&AssetId> =
                    closures[i].intersection(&closures[j]).collect();
                shared.sort();

                for target in shared {
                    let (Some(da), Some(db)) =
                        (self.direct_version(a, target), self.direct_version(b, target))
                    else {
                        continue;
                    };

                    if da.version != db.version {
                        conflicts.push(Conflict {
                            asset_ids: vec![a.clone(), b.clone(), target.clone()],
                            reason: format!(
                                "{} requires {}@{} but {} requires {}@{}",
                                a, target, da.version, b, target, db.version
                            ),
                            severity: Severity::Error,
                            resolution: Some(format!(
                                "align {} and {} on a single version of {}",
                                a, b, target
                            )),
                        });
                    } else if da.dep_type != db.dep_type {
                        conflicts.push(Conflict {
                            asset_ids: vec![a.clone(), b.clone(), target.clone()],
                            reason: format!(
                                "{} declares {} as {} but {} declares it as {}",
                                a, target, da.dep_type, b, db.dep_type
                            ),
                            severity: Severity::Warning,
                            resolution: None,
                        });
                    }
                }
            }
        }

        let mut seen_cycles: HashSet<Vec<AssetId>> = HashSet::new();
        for id in ids {
            if let Some(cycle) = self.find_cycle(id) {
                if seen_cycles.insert(canonical_cycle(&cycle)) {
                    warn!(cycle = ?cycle, "dependency cycle detected");
                    conflicts.push(Conflict {
                        reason: format!("circular dependency: {}", cycle.join(" -> ")),
                        asset_ids: cycle,
                        severity: Severity::Error,
                        resolution: Some("remove one of the edges in the cycle".to_string()),
                    });
                }
            }
        }

        conflicts
    }

    /// Every asset reachable from `id`, breadth-first, without `id` itself.
    pub fn resolve(&self, id: &str, assets: &HashMap<AssetId, Asset>) -> Result<Vec<Asset>> {
        let mut queue = VecDeque::from([id.to_string()]);
        let mut visited: HashSet<AssetId> = HashSet::from([id.to_string()]);
        let mut resolved = Vec::new();

        while let Some(current) = queue.pop_front() {
            for dep in self.dependency_edges(&current) {
                if !visited.insert(dep.depends_on.clone()) {
                    continue;
                }
                let asset = assets.get(&dep.depends_on).ok_or_else(|| {
                    AssetError::DependencyError(format!(
                        "{} depends on missing asset {}",
                        current, dep.depends_on
                    ))
                })?;
                resolved.push(asset.clone());
                queue.push_back(dep.depends_on.clone());
            }
        }

        Ok(resolved)
    }

    /// Dependencies before dependents for everything reachable from `ids`.
    /// Fails with `CircularDependency` instead of emitting a partial order.
    pub fn topological_order(&self, ids: &[AssetId]) -> Result<Vec<AssetId>> {
        for id in ids {
            if let Some(cycle) = self.find_cycle(id) {
                return Err(AssetError::CircularDependency(cycle.join(" -> ")));
            }
        }

        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for id in ids {
            self.post_order(id, &mut visited, &mut order);
        }
        Ok(order)
    }

    fn post_order(&self, id: &str, visited: &mut HashSet<AssetId>, order: &mut Vec<AssetId>) {
        if !visited.insert(id.to_string()) {
            return;
        }
        for dep in self.dependency_edges(id) {
            self.post_order(&dep.depends_on, visited, order);
        }
        order.push(id.to_string());
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Rotate so the smallest id leads, making the same cycle found from
/// different starting points compare equal.
fn canonical_cycle(cycle: &[AssetId]) -> Vec<AssetId> {
    let body = match cycle.split_last() {
        Some((_, body)) if !body.is_empty() => body,
        _ => return cycle.to_vec(),
    };
    let min = body
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    body[min..].iter().chain(body[..min].iter()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetlib_core::AssetCategory;

    fn chain() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph
            .add_dependency("a", "b", "1.0.0", DependencyType::Required)
            .unwrap();
        graph
            .add_dependency("b", "c", "1.0.0", DependencyType::Required)
            .unwrap();
        graph
    }

    #[test]
    fn test_reverse_edge_is_circular() {
        let mut graph = DependencyGraph::new();
        graph
            .add_dependency("a", "b", "1.0.0", DependencyType::Required)
            .unwrap();
        let err = graph
            .add_dependency("b", "a", "1.0.0", DependencyType::Required)
            .unwrap_err();
        assert!(matches!(err, AssetError::CircularDependency(_)));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_self_edge_is_circular() {
        let mut graph = DependencyGraph::new();
        assert!(graph
            .add_dependency("a", "a", "1.0.0", DependencyType::Required)
            .is_err());
    }

    #[test]
    fn test_transitive_cycle_rejected() {
        let mut graph = chain();
        let err = graph
            .add_dependency("c", "a", "1.0.0", DependencyType::Optional)
            .unwrap_err();
        assert!(matches!(err, AssetError::CircularDependency(_)));
    }

    #[test]
    fn test_duplicate_edge_is_idempotent() {
        let mut graph = DependencyGraph::new();
        assert!(graph
            .add_dependency("a", "b", "1.0.0", DependencyType::Required)
            .unwrap());
        assert!(!graph
            .add_dependency("a", "b", "2.0.0", DependencyType::Required)
            .unwrap());
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.direct_version("a", "b").unwrap().version, "1.0.0");
    }

    #[test]
    fn test_direct_and_transitive_queries() {
        let graph = chain();
        assert_eq!(graph.get_dependencies("a", false), vec!["b"]);
        assert_eq!(graph.get_dependencies("a", true), vec!["b", "c"]);
        assert_eq!(graph.get_dependents("c", false), vec!["b"]);
        assert_eq!(graph.get_dependents("c", true), vec!["b", "a"]);
    }

    #[test]
    fn test_topological_order_of_chain() {
        let graph = chain();
        let order = graph.topological_order(&["a".to_string()]).unwrap();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_topological_order_fails_on_restored_cycle() {
        let graph = DependencyGraph::from_edges(vec![
            Dependency::new("a", "b", "1.0.0", DependencyType::Required),
            Dependency::new("b", "a", "1.0.0", DependencyType::Required),
        ]);
        assert!(graph.has_cycle());
        let err = graph.topological_order(&["a".to_string()]).unwrap_err();
        assert!(matches!(err, AssetError::CircularDependency(_)));
    }

    #[test]
    fn test_version_conflict_on_shared_dependency() {
        let mut graph = DependencyGraph::new();
        graph
            .add_dependency("x", "d", "1.0", DependencyType::Required)
            .unwrap();
        graph
            .add_dependency("y", "d", "2.0", DependencyType::Required)
            .unwrap();

        let conflicts = graph.detect_conflicts(&["x".to_string(), "y".to_string()]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].severity, Severity::Error);
        assert!(conflicts[0].asset_ids.contains(&"d".to_string()));
    }

    #[test]
    fn test_same_version_different_type_is_warning() {
        let mut graph = DependencyGraph::new();
        graph
            .add_dependency("x", "d", "1.0", DependencyType::Required)
            .unwrap();
        graph
            .add_dependency("y", "d", "1.0", DependencyType::Optional)
            .unwrap();

        let conflicts = graph.detect_conflicts(&["x".to_string(), "y".to_string()]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].severity, Severity::Warning);
    }

    #[test]
    fn test_cycle_reported_once_per_cycle() {
        let graph = DependencyGraph::from_edges(vec![
            Dependency::new("a", "b", "1.0.0", DependencyType::Required),
            Dependency::new("b", "a", "1.0.0", DependencyType::Required),
        ]);
        let conflicts = graph.detect_conflicts(&["a".to_string(), "b".to_string()]);
        let cycles: Vec<_> = conflicts
            .iter()
            .filter(|c| c.reason.starts_with("circular"))
            .collect();
        assert_eq!(cycles.len(), 1);
    }

    #[test]
    fn test_build_graph_keeps_first_visit_depth() {
        // a -> b -> d, a -> d: d is found through b first.
        let mut graph = DependencyGraph::new();
        graph
            .add_dependency("a", "b", "1.0.0", DependencyType::Required)
            .unwrap();
        graph
            .add_dependency("b", "d", "1.0.0", DependencyType::Required)
            .unwrap();
        graph
            .add_dependency("a", "d", "1.0.0", DependencyType::Required)
            .unwrap();

        let tree = graph.build_graph("a");
        assert_eq!(tree.nodes.len(), 3);
        assert_eq!(tree.depth_of("a"), Some(0));
        assert_eq!(tree.depth_of("d"), Some(2));
        assert_eq!(tree.edges.len(), 3);
    }

    #[test]
    fn test_resolve_collects_unique_assets() {
        let graph = chain();
        let assets: HashMap<AssetId, Asset> = ["a", "b", "c"]
            .iter()
            .map(|id| (id.to_string(), Asset::new(*id, *id, AssetCategory::Components)))
            .collect();

        let resolved = graph.resolve("a", &assets).unwrap();
        let ids: Vec<_> = resolved.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_resolve_missing_asset_is_dependency_error() {
        let graph = chain();
        let assets: HashMap<AssetId, Asset> = [(
            "b".to_string(),
            Asset::new("b", "b", AssetCategory::Components),
        )]
        .into_iter()
        .collect();

        let err = graph.resolve("a", &assets).unwrap_err();
        assert!(matches!(err, AssetError::DependencyError(_)));
    }

    #[test]
    fn test_remove_asset_drops_both_directions() {
        let mut graph = chain();
        let removed = graph.remove_asset("b");
        assert_eq!(removed.len(), 2);
        assert!(graph.is_empty());
        assert!(graph.get_dependents("c", false).is_empty());
    }

    #[test]
    fn test_canonical_cycle_rotation() {
        let a = canonical_cycle(&["b".into(), "a".into(), "b".into()]);
        let b = canonical_cycle(&["a".into(), "b".into(), "a".into()]);
        assert_eq!(a, b);
    }
}
