//! Taskweave Sync
//!
//! Keeps the in-memory graph and a remote single-document store in step.
//! [`SyncEngine`] coalesces snapshots behind a debounce timer, serializes
//! writes, retries transient failures and tracks the silent versus
//! interactive credential flow. [`Workspace`] binds the engine to the graph
//! mutation operations.

pub mod config;
pub mod engine;
pub mod error;
pub mod retry;
pub mod session;
pub mod workspace;

pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncSnapshot, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use retry::{is_retryable, write_with_retry, RetryPolicy};
pub use session::SyncSession;
pub use workspace::{prepare_loaded, visible_outline, OutlineEntry, Workspace};
