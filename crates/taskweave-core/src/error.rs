use thiserror::Error;

/// Core error type for the Taskweave graph model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The document has no root node
    #[error("Graph document is missing the root node")]
    MissingRoot,

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// The document is not a well-formed graph object
    #[error("Invalid graph document: {0}")]
    InvalidDocument(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
