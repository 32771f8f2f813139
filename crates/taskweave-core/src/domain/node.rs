//! Node model
//!
//! A node is either a task or a text note. On the wire the variant is a
//! `"type"` tag flattened into the node object, with the variant fields
//! sitting next to the common ones.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt::{self, Display};
use uuid::Uuid;

/// Date format used for task due dates
pub const DUE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Opaque, globally unique node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Identifier of the root node
    pub const ROOT: &'static str = "root";

    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The root identifier
    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Whether this is the root identifier
    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    /// Get the string representation of the id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Task-specific fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFields {
    /// Whether the task is done
    pub completed: bool,
    /// Calendar date as stored in the document. Kept verbatim so that a
    /// value we cannot parse survives a load/save cycle.
    pub due_date: Option<String>,
    /// 0 means the task does not repeat
    pub repeat_days: u32,
}

impl TaskFields {
    /// Parsed due date, if present and valid
    pub fn due(&self) -> Option<NaiveDate> {
        self.due_date.as_deref().and_then(parse_due_date)
    }

    /// Whether the task repeats
    pub fn is_repeating(&self) -> bool {
        self.repeat_days > 0
    }
}

/// Text-note fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextFields {
    /// Markdown body
    pub content: String,
}

/// Node variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A checkable task
    Task(TaskFields),
    /// A text note
    Text(TextFields),
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Task(TaskFields::default())
    }
}

impl NodeKind {
    /// Wire name of the variant
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Task(_) => "task",
            NodeKind::Text(_) => "text",
        }
    }
}

/// A single node of the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "NodeRecord", into = "NodeRecord")]
pub struct Node {
    /// Display title
    pub title: String,
    /// Task or text payload
    pub kind: NodeKind,
    /// Ordered child identifiers; order is the display order
    pub children: Vec<NodeId>,
    /// Cosmetic flag; does not affect topology
    pub visible: bool,
    /// Minimal distance from the root. Derived, see [`crate::depth`].
    pub depth: u32,
}

impl Node {
    /// A visible, childless task
    pub fn task(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: NodeKind::Task(TaskFields::default()),
            children: Vec::new(),
            visible: true,
            depth: 0,
        }
    }

    /// A visible, childless text note
    pub fn text(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: NodeKind::Text(TextFields {
                content: content.into(),
            }),
            children: Vec::new(),
            visible: true,
            depth: 0,
        }
    }

    /// Builder-style children setter
    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style depth setter
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Builder-style visibility setter
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Task fields, when this node is a task
    pub fn as_task(&self) -> Option<&TaskFields> {
        match &self.kind {
            NodeKind::Task(task) => Some(task),
            NodeKind::Text(_) => None,
        }
    }

    /// Mutable task fields, when this node is a task
    pub fn as_task_mut(&mut self) -> Option<&mut TaskFields> {
        match &mut self.kind {
            NodeKind::Task(task) => Some(task),
            NodeKind::Text(_) => None,
        }
    }

    /// Text fields, when this node is a text note
    pub fn as_text(&self) -> Option<&TextFields> {
        match &self.kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Task(_) => None,
        }
    }

    /// Mutable text fields, when this node is a text note
    pub fn as_text_mut(&mut self) -> Option<&mut TextFields> {
        match &mut self.kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Task(_) => None,
        }
    }
}

/// Parse a due date, accepting either a plain calendar date or an RFC 3339
/// timestamp (whose date part is used).
pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DUE_DATE_FORMAT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Format a due date the way it is stored
pub fn format_due_date(date: NaiveDate) -> String {
    date.format(DUE_DATE_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum NodeType {
    #[default]
    Task,
    Text,
}

/// Wire representation of a node. Every field is optional so that documents
/// written by older clients still load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeRecord {
    #[serde(default)]
    title: String,
    #[serde(default, rename = "type")]
    node_type: NodeType,
    #[serde(default)]
    children: Vec<NodeId>,
    #[serde(default = "default_visible")]
    visible: bool,
    #[serde(default)]
    depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repeat_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

fn default_visible() -> bool {
    true
}

impl From<NodeRecord> for Node {
    fn from(record: NodeRecord) -> Self {
        let kind = match record.node_type {
            NodeType::Task => NodeKind::Task(TaskFields {
                completed: record.completed.unwrap_or(false),
                due_date: record.due_date.filter(|d| !d.is_empty()),
                repeat_days: record.repeat_days.unwrap_or(0),
            }),
            NodeType::Text => NodeKind::Text(TextFields {
                content: record.content.unwrap_or_default(),
            }),
        };
        Node {
            title: record.title,
            kind,
            children: record.children,
            visible: record.visible,
            depth: record.depth,
        }
    }
}

impl From<Node> for NodeRecord {
    fn from(node: Node) -> Self {
        let mut record = NodeRecord {
            title: node.title,
            node_type: NodeType::Task,
            children: node.children,
            visible: node.visible,
            depth: node.depth,
            completed: None,
            due_date: None,
            repeat_days: None,
            content: None,
        };
        match node.kind {
            NodeKind::Task(task) => {
                record.completed = Some(task.completed);
                record.due_date = task.due_date;
                record.repeat_days = Some(task.repeat_days);
            }
            NodeKind::Text(text) => {
                record.node_type = NodeType::Text;
                record.content = Some(text.content);
            }
        }
        record
    }
}
