//! The node graph
//!
//! A `Graph` is an immutable snapshot: node payloads are shared behind
//! `Arc`, so cloning a snapshot copies only the maps and a mutation copies
//! only the nodes it touches. Parents are never stored in the document; the
//! reverse index is rebuilt on load and kept in step by every mutation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::warn;

use super::node::{Node, NodeId};
use crate::error::{CoreError, CoreResult};

/// Serialized form of a graph: id -> node, ordered for stable output
pub type NodeMap = BTreeMap<NodeId, Node>;

/// Tree of task and text nodes rooted at [`NodeId::ROOT`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NodeMap", into = "NodeMap")]
pub struct Graph {
    nodes: HashMap<NodeId, Arc<Node>>,
    /// child id -> parent id
    parents: HashMap<NodeId, NodeId>,
}

impl Graph {
    /// A graph holding only the root task
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(NodeId::root(), Arc::new(Node::task("Root")));
        Self {
            nodes,
            parents: HashMap::new(),
        }
    }

    /// Build a graph from raw nodes, deriving the reverse index.
    ///
    /// Child ids that name no node are dropped. A node listed as a child of
    /// more than one parent keeps its first parent in the index.
    pub fn from_nodes<I>(nodes: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (NodeId, Node)>,
    {
        let nodes: HashMap<NodeId, Arc<Node>> = nodes
            .into_iter()
            .map(|(id, node)| (id, Arc::new(node)))
            .collect();

        if !nodes.contains_key(NodeId::ROOT) {
            return Err(CoreError::MissingRoot);
        }

        let mut graph = Self {
            nodes,
            parents: HashMap::new(),
        };
        graph.prune_unknown_children();
        graph.rebuild_parent_index();
        Ok(graph)
    }

    /// Parse a JSON document
    pub fn from_json(raw: &str) -> CoreResult<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Convert an already-parsed JSON value. Anything other than an object
    /// of nodes is rejected.
    pub fn from_value(value: serde_json::Value) -> CoreResult<Self> {
        if !value.is_object() {
            return Err(CoreError::InvalidDocument(format!(
                "expected an object, found {}",
                json_type_name(&value)
            )));
        }
        let nodes: NodeMap = serde_json::from_value(value)
            .map_err(|e| CoreError::InvalidDocument(e.to_string()))?;
        Self::from_nodes(nodes)
    }

    /// Serialize to a JSON document
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Identifier of the root node
    pub fn root_id(&self) -> NodeId {
        NodeId::root()
    }

    /// The root node
    pub fn root(&self) -> &Node {
        // Every constructor guarantees a root and deletion refuses to remove it.
        self.nodes
            .get(NodeId::ROOT)
            .map(Arc::as_ref)
            .unwrap_or_else(|| unreachable!("graph without root"))
    }

    /// Node with the given id
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id).map(Arc::as_ref)
    }

    /// Whether a node with the given id exists
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a well-formed graph
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node with its id, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Node)> {
        self.nodes.iter().map(|(id, node)| (id, node.as_ref()))
    }

    /// Every node id, in no particular order
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Parent of `id`, from the reverse index
    pub fn parent_of(&self, id: &str) -> Option<&NodeId> {
        self.parents.get(id)
    }

    /// Path from the parent of `id` up to the root, nearest first
    pub fn ancestors(&self, id: &str) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.parents.get(id);
        while let Some(parent) = current {
            if !seen.insert(parent.clone()) {
                warn!(node = %id, "cycle detected while walking ancestors");
                break;
            }
            path.push(parent.clone());
            current = self.parents.get(parent.as_str());
        }
        path
    }

    /// `id` followed by every transitive descendant, breadth first.
    /// Empty when `id` is absent.
    pub fn subtree(&self, id: &str) -> Vec<NodeId> {
        let Some((start, _)) = self.nodes.get_key_value(id) else {
            return Vec::new();
        };
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start.clone()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                queue.extend(node.children.iter().cloned());
            }
            order.push(current);
        }
        order
    }

    /// Every transitive descendant of `id`, excluding `id` itself
    pub fn descendants(&self, id: &str) -> Vec<NodeId> {
        let mut subtree = self.subtree(id);
        if !subtree.is_empty() {
            subtree.remove(0);
        }
        subtree
    }

    /// Mutable access to a node, copying it out of the shared snapshot
    /// first. Callers must not touch `children` through this; use
    /// [`Graph::set_children`] so the reverse index stays in step.
    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id).map(Arc::make_mut)
    }

    /// Insert a fresh node and append it to its parent's children
    pub(crate) fn attach_child(&mut self, parent_id: &NodeId, id: NodeId, node: Node) {
        if let Some(parent) = self.nodes.get_mut(parent_id).map(Arc::make_mut) {
            parent.children.push(id.clone());
            self.parents.insert(id.clone(), parent_id.clone());
            self.nodes.insert(id, Arc::new(node));
        }
    }

    /// Replace a node's child list. Only used for reordering, so the set of
    /// children (and therefore the reverse index) is unchanged.
    pub(crate) fn set_children(&mut self, parent_id: &str, children: Vec<NodeId>) {
        if let Some(parent) = self.node_mut(parent_id) {
            parent.children = children;
        }
    }

    /// Remove the given ids and strip every reference to them
    pub(crate) fn remove_nodes(&mut self, removed: &HashSet<NodeId>) {
        for id in removed {
            self.nodes.remove(id);
            self.parents.remove(id);
        }
        for node in self.nodes.values_mut() {
            if node.children.iter().any(|child| removed.contains(child)) {
                Arc::make_mut(node)
                    .children
                    .retain(|child| !removed.contains(child));
            }
        }
    }

    fn prune_unknown_children(&mut self) {
        let known: HashSet<NodeId> = self.nodes.keys().cloned().collect();
        for (id, node) in self.nodes.iter_mut() {
            if node.children.iter().all(|child| known.contains(child)) {
                continue;
            }
            Arc::make_mut(node).children.retain(|child| {
                let exists = known.contains(child);
                if !exists {
                    warn!(parent = %id, child = %child, "unknown child id; dropping edge");
                }
                exists
            });
        }
    }

    fn rebuild_parent_index(&mut self) {
        self.parents.clear();
        for (id, node) in &self.nodes {
            for child in &node.children {
                if child.is_root() {
                    warn!(parent = %id, "root listed as a child; ignoring edge");
                    continue;
                }
                if let Some(existing) = self.parents.get(child) {
                    warn!(
                        child = %child,
                        first_parent = %existing,
                        second_parent = %id,
                        "node has more than one parent"
                    );
                    continue;
                }
                self.parents.insert(child.clone(), id.clone());
            }
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<NodeMap> for Graph {
    type Error = CoreError;

    fn try_from(nodes: NodeMap) -> Result<Self, Self::Error> {
        Self::from_nodes(nodes)
    }
}

impl From<Graph> for NodeMap {
    fn from(graph: Graph) -> Self {
        graph
            .nodes
            .into_iter()
            .map(|(id, node)| (id, Arc::try_unwrap(node).unwrap_or_else(|shared| (*shared).clone())))
            .collect()
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
