//! Graph mutation operations
//!
//! Every operation takes a snapshot and returns a new one; the input is
//! never modified. Operations that do not apply (unknown id, nothing to
//! change) return a snapshot equal to the input.

use std::collections::HashSet;
use tracing::debug;

use crate::domain::{Graph, Node, NodeId, NodeKind};

/// Caller-supplied values for a freshly created node. Id, depth and
/// children are always assigned by [`create_child`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOverrides {
    /// Defaults to "Untitled"
    pub title: Option<String>,
    /// Defaults to an incomplete, non-repeating task
    pub kind: Option<NodeKind>,
    /// Defaults to visible
    pub visible: Option<bool>,
}

impl NodeOverrides {
    /// Overrides setting only the title
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Builder-style variant setter
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Fields merged into an existing node by [`patch`].
///
/// Has no `children` or `depth` field:
/// membership changes only through create/delete and depth is derived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    /// New title
    pub title: Option<String>,
    /// New visibility flag
    pub visible: Option<bool>,
    /// Replace the variant wholesale, applied before the field updates below
    pub kind: Option<NodeKind>,
    /// Task completion; ignored for text nodes
    pub completed: Option<bool>,
    /// `Some(None)` clears the due date
    pub due_date: Option<Option<String>>,
    /// Repeat interval in days; ignored for text nodes
    pub repeat_days: Option<u32>,
    /// Markdown body; ignored for tasks
    pub content: Option<String>,
}

impl NodePatch {
    /// Patch setting only the title
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Patch setting only task completion
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    /// Patch setting only the text body
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    fn apply(self, node: &mut Node) {
        if let Some(title) = self.title {
            node.title = title;
        }
        if let Some(visible) = self.visible {
            node.visible = visible;
        }
        if let Some(kind) = self.kind {
            node.kind = kind;
        }
        match &mut node.kind {
            NodeKind::Task(task) => {
                if let Some(completed) = self.completed {
                    task.completed = completed;
                }
                if let Some(due_date) = self.due_date {
                    task.due_date = due_date;
                }
                if let Some(repeat_days) = self.repeat_days {
                    task.repeat_days = repeat_days;
                }
            }
            NodeKind::Text(text) => {
                if let Some(content) = self.content {
                    text.content = content;
                }
            }
        }
    }
}

/// Create a child under `parent_id` and append it to the parent's children.
///
/// Returns the input snapshot and `None` when the parent does not exist.
pub fn create_child(
    graph: &Graph,
    parent_id: &str,
    overrides: NodeOverrides,
) -> (Graph, Option<NodeId>) {
    let Some(parent) = graph.get(parent_id) else {
        debug!(parent = %parent_id, "create_child: parent not found");
        return (graph.clone(), None);
    };

    let mut node = Node::task("Untitled").with_depth(parent.depth + 1);
    if let Some(title) = overrides.title {
        node.title = title;
    }
    if let Some(kind) = overrides.kind {
        node.kind = kind;
    }
    if let Some(visible) = overrides.visible {
        node.visible = visible;
    }

    let id = NodeId::generate();
    let mut next = graph.clone();
    next.attach_child(&NodeId::new(parent_id), id.clone(), node);
    debug!(parent = %parent_id, child = %id, "created child node");
    (next, Some(id))
}

/// Remove `id` together with every transitive descendant.
///
/// The root can never be deleted. No remaining node keeps a reference to a
/// removed id.
pub fn delete_subtree(graph: &Graph, id: &str) -> Graph {
    if id == NodeId::ROOT || !graph.contains(id) {
        return graph.clone();
    }

    let removed: HashSet<NodeId> = graph
        .subtree(id)
        .into_iter()
        .filter(|node_id| !node_id.is_root())
        .collect();

    let mut next = graph.clone();
    next.remove_nodes(&removed);
    debug!(node = %id, removed = removed.len(), "deleted subtree");
    next
}

/// Shallow-merge `fields` into node `id`
pub fn patch(graph: &Graph, id: &str, fields: NodePatch) -> Graph {
    if !graph.contains(id) {
        return graph.clone();
    }
    let mut next = graph.clone();
    if let Some(node) = next.node_mut(id) {
        fields.apply(node);
    }
    next
}

/// Stable-sort the children of `parent_id` by `position_of`, ties keeping
/// their current relative order.
///
/// Returns the input snapshot untouched when there are fewer than two
/// children or the order would not change.
pub fn reorder_children_by_position<F>(graph: &Graph, parent_id: &str, position_of: F) -> Graph
where
    F: Fn(&NodeId) -> f64,
{
    let Some(parent) = graph.get(parent_id) else {
        return graph.clone();
    };
    if parent.children.len() < 2 {
        return graph.clone();
    }

    let mut ranked: Vec<(f64, usize, &NodeId)> = parent
        .children
        .iter()
        .enumerate()
        .map(|(index, child)| (position_of(child), index, child))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    if ranked.iter().enumerate().all(|(index, entry)| entry.1 == index) {
        return graph.clone();
    }

    let order: Vec<NodeId> = ranked.into_iter().map(|(_, _, id)| id.clone()).collect();
    let mut next = graph.clone();
    next.set_children(parent_id, order);
    debug!(parent = %parent_id, "reordered children");
    next
}

/// Make the direct children of each id visible. Never hides anything and
/// never goes deeper than one level.
pub fn reveal_children<I, S>(graph: &Graph, ids: I) -> Graph
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut next = graph.clone();
    for id in ids {
        let hidden: Vec<NodeId> = match graph.get(id.as_ref()) {
            Some(node) => node
                .children
                .iter()
                .filter(|child| graph.get(child.as_str()).is_some_and(|c| !c.visible))
                .cloned()
                .collect(),
            None => continue,
        };
        for child in hidden {
            if let Some(node) = next.node_mut(child.as_str()) {
                node.visible = true;
            }
        }
    }
    next
}
