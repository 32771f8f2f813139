//! Error types for the sync engine

use taskweave_core::CoreError;
use taskweave_store::StoreError;
use thiserror::Error;

/// Sync error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// No credential is available; an explicit connect is needed
    #[error("Authentication required; connect to continue")]
    NeedsAuth,

    /// Remote store or credential failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Graph (de)serialization failure
    #[error("Graph error: {0}")]
    Core(#[from] CoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SyncError {
    /// Whether the failure is resolved by connecting rather than retrying
    pub fn needs_auth(&self) -> bool {
        matches!(
            self,
            SyncError::NeedsAuth | SyncError::Store(StoreError::AuthRequired)
        )
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
