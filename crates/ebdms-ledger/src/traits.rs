use chrono::{DateTime, Utc};
use ebdms_crypto::{HashChainVerifier, GENESIS_PREV_HASH};
use ebdms_types::ActorId;

use crate::entry::{AuditEntry, AuditEvent, SubjectType};
use crate::error::LedgerError;
use crate::filter::AuditFilter;

/// Write boundary of the audit ledger.
///
/// `append` is the single serialization point for sequence allocation:
/// concurrent callers never receive the same sequence number and never
/// fork the chain.
pub trait AuditWriter: Send + Sync {
    fn append(&self, event: AuditEvent) -> Result<AuditEntry, LedgerError>;
}

/// Read boundary of the audit ledger. Nothing here can alter the sequence
/// or the chain.
pub trait AuditReader: Send + Sync {
    /// The most recent entry, if any.
    fn head(&self) -> Result<Option<AuditEntry>, LedgerError>;

    /// Number of entries (one past the highest sequence number).
    fn entry_count(&self) -> Result<u64, LedgerError>;

    /// Entries `from_seq..=to_seq`.
    fn read_range(&self, from_seq: u64, to_seq: u64) -> Result<Vec<AuditEntry>, LedgerError>;

    fn read_all(&self) -> Result<Vec<AuditEntry>, LedgerError>;

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, LedgerError>;

    fn by_actor(&self, actor_id: &ActorId) -> Result<Vec<AuditEntry>, LedgerError> {
        self.query(&AuditFilter::new().actor(actor_id.clone()))
    }

    fn by_subject(
        &self,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> Result<Vec<AuditEntry>, LedgerError> {
        self.query(&AuditFilter::new().subject(subject_type, subject_id))
    }

    fn by_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditEntry>, LedgerError> {
        self.query(&AuditFilter::new().between(from, to))
    }

    /// Recompute hashes over `from_seq..=to_seq` and check every link,
    /// including the link from the entry before `from_seq`.
    fn verify_range(&self, from_seq: u64, to_seq: u64) -> Result<(), LedgerError> {
        let entries = self.read_range(from_seq, to_seq)?;
        let anchor = if from_seq == 0 {
            GENESIS_PREV_HASH
        } else {
            self.read_range(from_seq - 1, from_seq - 1)?
                .first()
                .map(|e| e.entry_hash)
                .ok_or(LedgerError::InvalidRange {
                    from: from_seq,
                    to: to_seq,
                })?
        };
        HashChainVerifier::verify_run(&entries, anchor)?;
        Ok(())
    }

    /// Boolean form of [`verify_range`](Self::verify_range).
    fn verify_chain(&self, from_seq: u64, to_seq: u64) -> bool {
        match self.verify_range(from_seq, to_seq) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(from_seq, to_seq, error = %e, "audit chain verification failed");
                false
            }
        }
    }

    /// Verify the whole chain from genesis. An empty ledger is valid.
    fn verify_all(&self) -> Result<(), LedgerError> {
        let entries = self.read_all()?;
        HashChainVerifier::verify_from_genesis(&entries)?;
        Ok(())
    }
}
