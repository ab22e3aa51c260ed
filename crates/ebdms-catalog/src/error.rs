//! Error types for catalog operations.

use ebdms_types::{FileId, TypeError, UploadState};
use thiserror::Error;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The addressed row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A row with this identity already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// Optimistic precondition failed: the row moved on since it was read,
    /// or the transaction lost a serialization race.
    #[error("conflicting state for file {file_id}: expected {expected}, found {actual}")]
    ConflictingState {
        file_id: FileId,
        expected: UploadState,
        actual: UploadState,
    },

    /// The requested state change is not an edge of the state machine.
    #[error(transparent)]
    InvalidTransition(#[from] TypeError),

    /// A record may only reference COMMITTED files.
    #[error("file {file_id} is {state}, only COMMITTED files may be referenced")]
    NotCommitted { file_id: FileId, state: UploadState },

    #[error("primary file {file_id} is {state}, not COMMITTED")]
    PrimaryNotCommitted { file_id: FileId, state: UploadState },

    #[error("index file {file_id} is {state}, not COMMITTED")]
    IndexNotCommitted { file_id: FileId, state: UploadState },

    #[error("incompatible index: {reason}")]
    IncompatibleIndex { reason: String },

    /// Rows from different projects cannot be related.
    #[error("{left} and {right} belong to different projects")]
    CrossProject { left: String, right: String },

    /// Adding `requested` bytes would push the project past its ceiling.
    #[error("quota exceeded: usage {usage} + requested {requested} > ceiling {ceiling} bytes")]
    QuotaExceeded {
        usage: u64,
        requested: u64,
        ceiling: u64,
    },

    /// The catalog could not be reached or aborted the transaction.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    /// Internal state lock was poisoned by a panicking writer.
    #[error("catalog lock poisoned")]
    LockPoisoned,
}

impl CatalogError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Convenience type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
