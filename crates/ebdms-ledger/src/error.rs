/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Recomputed hashes or links disagree with what is persisted. Never
    /// auto-repaired.
    #[error("chain verification failed at seq {seq}: {reason}")]
    ChainVerificationFailed { seq: u64, reason: String },

    #[error("invalid sequence range: from={from}, to={to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("ledger I/O error: {0}")]
    Io(String),

    #[error("ledger lock poisoned")]
    LockPoisoned,
}

impl From<ebdms_crypto::ChainError> for LedgerError {
    fn from(e: ebdms_crypto::ChainError) -> Self {
        Self::ChainVerificationFailed {
            seq: e.seq(),
            reason: e.to_string(),
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
