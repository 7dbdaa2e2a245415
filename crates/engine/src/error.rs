use ordersync_core::{CoreError, RowId, ValueRejection};
use ordersync_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("promotion failed: {0}")]
    Promotion(String),
}

/// Why an edit did not commit. Recoverable: the field is back to its prior
/// value and the engine is idle for the pair.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("role may not edit {field}")]
    PermissionDenied { field: String },

    #[error("row has no durable id")]
    IdentityMissing,

    #[error(transparent)]
    InvalidValue(#[from] ValueRejection),

    #[error("could not save {field}: {message}")]
    PersistenceFailed { field: String, message: String },

    #[error("row not found")]
    RowNotFound { id: Option<RowId> },

    #[error("pending write for {field} was cancelled")]
    Cancelled { field: String },
}
