//! The editing session: current graph snapshot plus its sync engine.
//!
//! Every mutation goes through the pure operations in `taskweave_core`;
//! when the resulting graph differs from the current one it becomes the
//! new snapshot and is scheduled for saving.

use chrono::NaiveDate;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use taskweave_core::{
    advance_recurring_tasks, create_child, delete_subtree, normalize_visibility, patch,
    recompute_depths, reorder_children_by_position, reveal_children, Graph, NodeId,
    NodeOverrides, NodePatch,
};
use tracing::{debug, info, warn};

use crate::engine::{SyncEngine, SyncStatus};
use crate::error::SyncResult;

/// Derivation passes for a freshly loaded document: advance recurring
/// tasks, recompute depths, and on the first load of a session normalize
/// visibility.
pub fn prepare_loaded(graph: &Graph, today: NaiveDate, first_load: bool) -> Graph {
    let graph = advance_recurring_tasks(graph, today);
    let graph = recompute_depths(&graph);
    if first_load {
        normalize_visibility(&graph)
    } else {
        graph
    }
}

/// One line of the visible outline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    pub id: NodeId,
    pub depth: u32,
    pub title: String,
}

/// Visible nodes in depth-first order, starting below the root.
///
/// A hidden node hides its whole subtree.
pub fn visible_outline(graph: &Graph) -> Vec<OutlineEntry> {
    let mut entries = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut stack: Vec<NodeId> = graph.root().children.iter().rev().cloned().collect();

    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        let Some(node) = graph.get(id.as_str()) else {
            continue;
        };
        if !node.visible {
            continue;
        }
        stack.extend(node.children.iter().rev().cloned());
        entries.push(OutlineEntry {
            id,
            depth: node.depth,
            title: node.title.clone(),
        });
    }
    entries
}

/// Current graph bound to a sync engine
#[derive(Debug)]
pub struct Workspace {
    graph: RwLock<Graph>,
    engine: SyncEngine,
    loaded_once: AtomicBool,
}

impl Workspace {
    /// Start from the default graph
    pub fn new(engine: SyncEngine) -> Self {
        Self::with_graph(engine, Graph::new())
    }

    pub fn with_graph(engine: SyncEngine, graph: Graph) -> Self {
        Self {
            graph: RwLock::new(graph),
            engine,
            loaded_once: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn status(&self) -> SyncStatus {
        self.engine.status()
    }

    /// Current snapshot
    pub fn graph(&self) -> Graph {
        self.graph.read().clone()
    }

    pub fn outline(&self) -> Vec<OutlineEntry> {
        visible_outline(&self.graph.read())
    }

    /// Silent start; adopts the remote document when one is available
    pub async fn start(&self, today: NaiveDate) -> SyncResult<SyncStatus> {
        if let Some(remote) = self.engine.start().await? {
            self.adopt(remote, today)?;
        }
        Ok(self.engine.status())
    }

    /// Interactive connect; adopts the remote document when one is available
    pub async fn connect(&self, today: NaiveDate) -> SyncResult<SyncStatus> {
        if let Some(remote) = self.engine.connect().await? {
            self.adopt(remote, today)?;
        }
        Ok(self.engine.status())
    }

    /// Replace local state with a loaded document after running the
    /// startup passes. Saves again only if the passes changed something.
    pub fn adopt(&self, loaded: Graph, today: NaiveDate) -> SyncResult<()> {
        let first_load = !self.loaded_once.swap(true, Ordering::SeqCst);
        let prepared = prepare_loaded(&loaded, today, first_load);
        let changed = prepared != loaded;
        info!(nodes = prepared.len(), first_load, changed, "adopted loaded document");

        *self.graph.write() = prepared.clone();
        if changed {
            self.engine.schedule(&prepared)?;
        }
        Ok(())
    }

    /// Apply a pure operation; store and schedule the result if it differs
    fn commit<F>(&self, operation: &str, apply: F) -> SyncResult<bool>
    where
        F: FnOnce(&Graph) -> Graph,
    {
        let mut current = self.graph.write();
        let next = apply(&current);
        if next == *current {
            debug!(operation, "no change");
            return Ok(false);
        }
        *current = next;
        let snapshot = current.clone();
        drop(current);

        if let Err(e) = self.engine.schedule(&snapshot) {
            warn!(operation, error = %e, "could not schedule save");
            return Err(e);
        }
        Ok(true)
    }

    /// Append a new child under `parent_id`; `None` if the parent is absent
    pub fn create_child(
        &self,
        parent_id: &str,
        overrides: NodeOverrides,
    ) -> SyncResult<Option<NodeId>> {
        let mut created = None;
        self.commit("create_child", |graph| {
            let (next, id) = create_child(graph, parent_id, overrides);
            created = id;
            next
        })?;
        Ok(created)
    }

    pub fn delete_subtree(&self, id: &str) -> SyncResult<bool> {
        self.commit("delete_subtree", |graph| delete_subtree(graph, id))
    }

    pub fn patch(&self, id: &str, fields: NodePatch) -> SyncResult<bool> {
        self.commit("patch", |graph| patch(graph, id, fields))
    }

    pub fn reorder_children_by_position<F>(&self, parent_id: &str, position_of: F) -> SyncResult<bool>
    where
        F: Fn(&NodeId) -> f64,
    {
        self.commit("reorder", |graph| {
            reorder_children_by_position(graph, parent_id, position_of)
        })
    }

    pub fn reveal_children<I, S>(&self, ids: I) -> SyncResult<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.commit("reveal_children", |graph| reveal_children(graph, ids))
    }

    pub async fn flush(&self) -> SyncResult<()> {
        self.engine.flush().await
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        self.engine.shutdown().await
    }
}
