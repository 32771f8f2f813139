//! First-load visibility normalization

use crate::domain::{Graph, NodeId};

/// Hide everything, then show the root and its direct children.
///
/// Only used when bootstrapping a freshly loaded document; afterwards
/// visibility changes only through [`crate::store::reveal_children`].
pub fn normalize_visibility(graph: &Graph) -> Graph {
    let root_children = graph.root().children.clone();
    let ids: Vec<NodeId> = graph.ids().cloned().collect();

    let mut next = graph.clone();
    for id in ids {
        let visible = id.is_root() || root_children.contains(&id);
        let current = graph.get(id.as_str()).map(|node| node.visible);
        if current != Some(visible) {
            if let Some(node) = next.node_mut(id.as_str()) {
                node.visible = visible;
            }
        }
    }
    next
}
