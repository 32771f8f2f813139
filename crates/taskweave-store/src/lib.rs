//! Taskweave Store
//!
//! Provides abstractions and implementations for the single remote JSON
//! document that mirrors a user's graph. The [`RemoteDocumentStore`] trait
//! defines find/create/read/write against an application-private storage
//! space; [`TokenProvider`] owns the OAuth bearer credential every call
//! needs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A document found in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
}

/// Errors that can occur during store and credential operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No credential is available and none could be obtained silently
    #[error("Authentication required")]
    AuthRequired,

    /// The credential was rejected, or the user declined to grant one
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Non-success HTTP status from the backend
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Catch-all for backend-specific issues
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

impl StoreError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the error is about credentials rather than the request
    pub fn is_auth(&self) -> bool {
        matches!(self, StoreError::AuthRequired | StoreError::Auth(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerializationError(err.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Contract for the remote single-document store.
///
/// Implementations authorize every call with the current bearer credential.
#[async_trait]
pub trait RemoteDocumentStore: Send + Sync + std::fmt::Debug {
    /// Look up a (non-trashed) document by exact name; first match only
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<RemoteFile>>;

    /// Create an empty document and return its id
    async fn create(&self, name: &str) -> StoreResult<String>;

    /// Read a document's content. A missing document is `Ok(None)`.
    async fn read(&self, id: &str) -> StoreResult<Option<String>>;

    /// Replace a document's content in place
    async fn write(&self, id: &str, payload: &str) -> StoreResult<()>;
}

// Re-export modules so they can be used from other crates
pub mod drive;
pub mod local;
pub mod memory;
pub mod token;

pub use drive::{DriveConfig, DriveDocumentStore};
pub use local::LocalFileStore;
pub use memory::InMemoryDocumentStore;
pub use token::{
    AccessToken, CachedTokenProvider, CredentialSource, ScriptedCredentialSource,
    StaticCredentialSource, TokenProvider,
};
