use ebdms_catalog::CatalogError;
use ebdms_gate::GateError;
use ebdms_ledger::LedgerError;
use ebdms_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the registration engine and the [`Ebdms`](crate::Ebdms)
/// facade.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("access denied: {reason}")]
    PolicyDenied { reason: String },

    #[error("quota exceeded: usage {usage} + requested {requested} > ceiling {ceiling} bytes")]
    QuotaExceeded {
        usage: u64,
        requested: u64,
        ceiling: u64,
    },

    #[error("project {0} is not accepting uploads")]
    ProjectInactive(String),

    #[error("checksum mismatch for {object_key}: expected {expected}, stored {actual}")]
    ChecksumMismatch {
        object_key: String,
        expected: String,
        actual: String,
    },

    #[error("size mismatch for {object_key}: declared {declared} bytes, stored {actual}")]
    SizeMismatch {
        object_key: String,
        declared: u64,
        actual: u64,
    },

    #[error("no stored object at {0}")]
    ObjectMissing(String),

    /// A precondition on catalog state failed, or a serialization race was
    /// lost.
    #[error("conflicting state: {0}")]
    ConflictingState(String),

    #[error("object storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("{operation} timed out after {elapsed_ms} ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("incompatible index: {0}")]
    IncompatibleIndex(String),

    #[error("primary file {0} is not COMMITTED")]
    PrimaryNotCommitted(String),

    #[error("index file {0} is not COMMITTED")]
    IndexNotCommitted(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The request is malformed independently of catalog state.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("audit chain verification failed at seq {seq}: {reason}")]
    ChainVerificationFailed { seq: u64, reason: String },

    #[error("ledger error: {0}")]
    Ledger(LedgerError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    /// Whether the same request may succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_)
                | Self::CatalogUnavailable(_)
                | Self::Timeout { .. }
                | Self::ConflictingState(_)
        )
    }

    /// HTTP status an outer layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::PolicyDenied { .. } | Self::ProjectInactive(_) => 403,
            Self::QuotaExceeded { .. } => 413,
            Self::ConflictingState(_)
            | Self::InvalidTransition(_)
            | Self::PrimaryNotCommitted(_)
            | Self::IndexNotCommitted(_) => 409,
            Self::ChecksumMismatch { .. }
            | Self::SizeMismatch { .. }
            | Self::IncompatibleIndex(_)
            | Self::InvalidRequest(_) => 422,
            Self::StorageUnavailable(_) | Self::CatalogUnavailable(_) => 503,
            Self::Timeout { .. } => 504,
            Self::NotFound { .. } | Self::ObjectMissing(_) => 404,
            Self::ChainVerificationFailed { .. }
            | Self::Ledger(_)
            | Self::Config(_)
            | Self::Internal(_) => 500,
        }
    }

    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => Self::ObjectMissing(key),
            StoreError::Unavailable(msg) => Self::StorageUnavailable(msg),
            other => Self::Internal(format!("object store: {other}")),
        }
    }
}

impl From<CatalogError> for RegistryError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound { entity, id } => Self::NotFound {
                entity: entity.to_string(),
                id,
            },
            CatalogError::AlreadyExists { .. }
            | CatalogError::ConflictingState { .. }
            | CatalogError::NotCommitted { .. } => Self::ConflictingState(err.to_string()),
            CatalogError::InvalidTransition(e) => Self::InvalidTransition(e.to_string()),
            CatalogError::PrimaryNotCommitted { file_id, .. } => {
                Self::PrimaryNotCommitted(file_id.to_string())
            }
            CatalogError::IndexNotCommitted { file_id, .. } => {
                Self::IndexNotCommitted(file_id.to_string())
            }
            CatalogError::IncompatibleIndex { reason } => Self::IncompatibleIndex(reason),
            CatalogError::CrossProject { .. } => Self::InvalidRequest(err.to_string()),
            CatalogError::QuotaExceeded {
                usage,
                requested,
                ceiling,
            } => Self::QuotaExceeded {
                usage,
                requested,
                ceiling,
            },
            CatalogError::Unavailable(msg) => Self::CatalogUnavailable(msg),
            CatalogError::LockPoisoned => Self::Internal(err.to_string()),
        }
    }
}

impl From<LedgerError> for RegistryError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ChainVerificationFailed { seq, reason } => {
                Self::ChainVerificationFailed { seq, reason }
            }
            other => Self::Ledger(other),
        }
    }
}

impl From<GateError> for RegistryError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Config(msg) => Self::Config(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ebdms_types::TypeError> for RegistryError {
    fn from(err: ebdms_types::TypeError) -> Self {
        match err {
            ebdms_types::TypeError::InvalidTransition { .. } => Self::InvalidTransition(err.to_string()),
            other => Self::InvalidRequest(other.to_string()),
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
