//! Domain layer - the node and graph model

/// Graph snapshots and the reverse parent index
pub mod graph;
/// Nodes, identifiers and the wire format
pub mod node;

pub use graph::{Graph, NodeMap};
pub use node::{
    format_due_date, parse_due_date, Node, NodeId, NodeKind, TaskFields, TextFields,
    DUE_DATE_FORMAT,
};
