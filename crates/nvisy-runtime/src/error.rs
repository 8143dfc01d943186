//! Runtime error types.

use nvisy_core::TaskId;
use nvisy_core::document::DocumentId;
use thiserror::Error;

use crate::task::TaskStatus;

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors surfaced by the task manager and its components.
///
/// Attempt-level provider failures never show up here: they are absorbed by
/// the reprocessing workflow and recorded on the attempt.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The submission itself is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No task with this id is known.
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// The operation is not allowed in the task's current status.
    #[error("cannot {operation} task {task_id} while it is {status}")]
    InvalidState {
        /// Task the operation targeted.
        task_id: TaskId,
        /// Status at the time of the request.
        status: TaskStatus,
        /// Rejected operation.
        operation: &'static str,
    },

    /// The referenced source bytes are not in the store.
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),

    /// The source bytes could not be parsed.
    #[error("unreadable document: {0}")]
    UnreadableDocument(String),

    /// No registered provider can run the document.
    #[error("no provider available: {0}")]
    NoProvider(String),

    /// Engine configuration is invalid.
    #[error("invalid config: {0}")]
    Config(String),

    /// The task manager has been shut down.
    #[error("task manager is shut down")]
    ShutDown,

    /// Durable store operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] nvisy_core::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Returns `true` if the source document itself is at fault.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::UnreadableDocument(_) | Self::InvalidRequest(_))
    }
}
