use assetlib_core::AssetId;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Node materialized by [`crate::DependencyGraph::build_graph`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: AssetId,
    pub depth: usize,
}

/// Depth-first view of everything reachable from `root`.
///
/// Depth is recorded on first discovery only, so in a diamond the shared
/// node keeps the depth of whichever branch reached it first, not the
/// shortest path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyTree {
    pub root: AssetId,
    pub nodes: Vec<GraphNode>,
    /// Every traversed edge, including edges into already-visited nodes
    pub edges: Vec<(AssetId, AssetId)>,
}

impl DependencyTree {
    pub fn depth_of(&self, id: &str) -> Option<usize> {
        self.nodes.iter().find(|n| n.id == id).map(|n| n.depth)
    }

    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }
}

/// Breadth-first walk from `start`, returning every reachable id once in
/// discovery order. `start` itself is excluded.
pub fn breadth_first<F>(start: &str, neighbors: F) -> Vec<AssetId>
where
    F: Fn(&str) -> Vec<AssetId>,
{
    let mut queue = VecDeque::new();
    let mut visited: HashSet<AssetId> = HashSet::new();
    let mut out = Vec::new();

    visited.insert(start.to_string());
    queue.push_back(start.to_string());

    while let Some(current) = queue.pop_front() {
        for neighbor in neighbors(&current) {
            if visited.insert(neighbor.clone()) {
                out.push(neighbor.clone());
                queue.push_back(neighbor);
            }
        }
    }

    out
}
