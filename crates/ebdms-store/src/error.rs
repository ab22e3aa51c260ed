/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The multipart upload id is unknown (never created, completed, or aborted).
    #[error("multipart upload not found: {0}")]
    UploadNotFound(String),

    /// A completed-part list referenced a part that was never uploaded,
    /// or whose etag no longer matches.
    #[error("invalid part {part_number} in upload {upload_id}: {reason}")]
    InvalidPart {
        upload_id: String,
        part_number: u32,
        reason: String,
    },

    /// The backend could not be reached or refused the request.
    #[error("object store unavailable: {0}")]
    Unavailable(String),

    /// I/O error while reading a payload stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal state lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
