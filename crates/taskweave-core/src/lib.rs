//!
//! Taskweave Core - node graph model and mutation engine
//!
//! This crate owns the canonical node graph: the data model, the pure
//! mutation operations that preserve its structural invariants, and the
//! derivation passes (depth, visibility, recurrence) run over snapshots.
//! It knows nothing about transport or persistence.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - nodes and graphs
pub mod domain;

/// Graph mutation operations
pub mod store;

/// Depth recomputation
pub mod depth;

/// First-load visibility normalization
pub mod visibility;

/// Due-date advancement for repeating tasks
pub mod recurrence;

/// Error types
pub mod error;

// Re-export key types
pub use domain::{Graph, Node, NodeId, NodeKind, NodeMap, TaskFields, TextFields};
pub use error::{CoreError, CoreResult};

pub use depth::recompute_depths;
pub use recurrence::advance_recurring_tasks;
pub use store::{
    create_child, delete_subtree, patch, reorder_children_by_position, reveal_children,
    NodeOverrides, NodePatch,
};
pub use visibility::normalize_visibility;
