//! Depth recomputation

use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::domain::{Graph, NodeId};

/// Recompute every reachable node's depth as its minimal BFS distance from
/// the root.
///
/// A node discovered again through a shorter path is re-enqueued with the
/// smaller depth. Nodes that cannot be reached from the root keep whatever
/// depth they had. Only nodes whose depth actually changes are rewritten.
pub fn recompute_depths(graph: &Graph) -> Graph {
    let mut distances: HashMap<NodeId, u32> = HashMap::with_capacity(graph.len());
    let mut queue = VecDeque::new();

    distances.insert(NodeId::root(), 0);
    queue.push_back(NodeId::root());

    while let Some(current) = queue.pop_front() {
        let Some(node) = graph.get(current.as_str()) else {
            continue;
        };
        let next_depth = distances[&current] + 1;
        for child in &node.children {
            if !graph.contains(child.as_str()) {
                continue;
            }
            let shorter = distances
                .get(child)
                .map_or(true, |&known| next_depth < known);
            if shorter {
                distances.insert(child.clone(), next_depth);
                queue.push_back(child.clone());
            }
        }
    }

    let changed: Vec<(NodeId, u32)> = distances
        .into_iter()
        .filter(|(id, depth)| {
            graph
                .get(id.as_str())
                .is_some_and(|node| node.depth != *depth)
        })
        .collect();

    if changed.is_empty() {
        return graph.clone();
    }

    debug!(changed = changed.len(), "recomputed node depths");
    let mut next = graph.clone();
    for (id, depth) in changed {
        if let Some(node) = next.node_mut(id.as_str()) {
            node.depth = depth;
        }
    }
    next
}
