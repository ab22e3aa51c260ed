use std::sync::RwLock;

use chrono::Utc;
use ebdms_crypto::GENESIS_PREV_HASH;

use crate::entry::{AuditEntry, AuditEvent};
use crate::error::LedgerError;
use crate::filter::AuditFilter;
use crate::traits::{AuditReader, AuditWriter};

/// Ordered entries plus the append rule shared by every backend.
#[derive(Default)]
pub(crate) struct ChainState {
    pub(crate) entries: Vec<AuditEntry>,
}

impl ChainState {
    /// Seal the next entry without storing it.
    ///
    /// Timestamps never go backwards along the chain even if the wall clock
    /// does.
    pub(crate) fn next_entry(&self, event: AuditEvent) -> AuditEntry {
        let last = self.entries.last();
        let seq = self.entries.len() as u64;
        let prev_hash = last.map_or(GENESIS_PREV_HASH, |e| e.entry_hash);
        let now = Utc::now();
        let timestamp = match last {
            Some(prev) if prev.timestamp > now => prev.timestamp,
            _ => now,
        };
        AuditEntry::seal(event, seq, timestamp, prev_hash)
    }

    pub(crate) fn range(&self, from_seq: u64, to_seq: u64) -> Result<Vec<AuditEntry>, LedgerError> {
        let len = self.entries.len() as u64;
        if from_seq > to_seq || to_seq >= len {
            return Err(LedgerError::InvalidRange {
                from: from_seq,
                to: to_seq,
            });
        }
        Ok(self.entries[from_seq as usize..=to_seq as usize].to_vec())
    }
}

/// In-memory audit ledger for tests, local demos, and embedding.
///
/// The write lock is the single-writer serialization point: sequence
/// allocation, hashing, and the push happen under it as one step.
#[derive(Default)]
pub struct InMemoryAuditLedger {
    inner: RwLock<ChainState>,
}

impl InMemoryAuditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<std::sync::RwLockReadGuard<'_, ChainState>, LedgerError> {
        self.inner.read().map_err(|_| LedgerError::LockPoisoned)
    }
}

impl AuditWriter for InMemoryAuditLedger {
    fn append(&self, event: AuditEvent) -> Result<AuditEntry, LedgerError> {
        let mut state = self.inner.write().map_err(|_| LedgerError::LockPoisoned)?;
        let entry = state.next_entry(event);
        state.entries.push(entry.clone());
        tracing::debug!(
            seq = entry.sequence_number,
            action = %entry.action,
            subject_id = %entry.subject_id,
            "audit entry appended"
        );
        Ok(entry)
    }
}

impl AuditReader for InMemoryAuditLedger {
    fn head(&self) -> Result<Option<AuditEntry>, LedgerError> {
        Ok(self.state()?.entries.last().cloned())
    }

    fn entry_count(&self) -> Result<u64, LedgerError> {
        Ok(self.state()?.entries.len() as u64)
    }

    fn read_range(&self, from_seq: u64, to_seq: u64) -> Result<Vec<AuditEntry>, LedgerError> {
        self.state()?.range(from_seq, to_seq)
    }

    fn read_all(&self) -> Result<Vec<AuditEntry>, LedgerError> {
        Ok(self.state()?.entries.clone())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, LedgerError> {
        Ok(filter.apply(&self.state()?.entries))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::entry::{AuditAction, SubjectType};
    use ebdms_types::ActorId;

    fn event(actor: &str, action: AuditAction, subject: &str) -> AuditEvent {
        AuditEvent::new(
            ActorId::new(actor).unwrap(),
            action,
            SubjectType::FileObject,
            subject,
        )
    }

    fn seeded(n: usize) -> InMemoryAuditLedger {
        let ledger = InMemoryAuditLedger::new();
        for i in 0..n {
            ledger
                .append(event("alice", AuditAction::UploadBegun, &format!("f{i}")))
                .unwrap();
        }
        ledger
    }

    // ----- Append -----

    #[test]
    fn chain_is_rooted_at_sequence_zero() {
        let ledger = seeded(3);
        let entries = ledger.read_all().unwrap();
        assert_eq!(entries[0].sequence_number, 0);
        assert_eq!(entries[0].prev_hash, GENESIS_PREV_HASH);
        assert_eq!(entries[1].prev_hash, entries[0].entry_hash);
        assert_eq!(entries[2].prev_hash, entries[1].entry_hash);
        assert_eq!(ledger.head().unwrap().unwrap().sequence_number, 2);
    }

    #[test]
    fn concurrent_appends_keep_sequence_dense_and_chain_intact() {
        let ledger = Arc::new(InMemoryAuditLedger::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        ledger
                            .append(event(&format!("actor-{t}"), AuditAction::FileFetched, &format!("f{i}")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let entries = ledger.read_all().unwrap();
        assert_eq!(entries.len(), 400);
        for (i, e) in entries.iter().enumerate() {
            assert_eq!(e.sequence_number, i as u64);
        }
        assert!(ledger.verify_all().is_ok());
        assert!(ledger.verify_chain(0, 399));
    }

    #[test]
    fn timestamps_never_regress() {
        let ledger = seeded(20);
        let entries = ledger.read_all().unwrap();
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    // ----- Verification -----

    #[test]
    fn untouched_chain_verifies() {
        let ledger = seeded(10);
        assert!(ledger.verify_chain(0, 9));
        assert!(ledger.verify_chain(4, 7));
        assert!(ledger.verify_range(9, 9).is_ok());
    }

    #[test]
    fn mutating_any_entry_breaks_verification() {
        let ledger = seeded(6);
        {
            let mut state = ledger.inner.write().unwrap();
            state.entries[3].actor_id = ActorId::new("mallory").unwrap();
        }
        assert!(!ledger.verify_chain(0, 5));
        assert!(!ledger.verify_chain(3, 3));
        // Entries before the tampered one still verify.
        assert!(ledger.verify_chain(0, 2));
        assert_eq!(
            ledger.verify_all(),
            Err(LedgerError::ChainVerificationFailed {
                seq: 3,
                reason: "hash mismatch at seq 3: computed hash differs from stored".into()
            })
        );
    }

    #[test]
    fn relinking_a_tampered_entry_breaks_the_next_link() {
        let ledger = seeded(5);
        {
            let mut state = ledger.inner.write().unwrap();
            state.entries[2].detail = Some("forged".into());
            let rehashed = state.entries[2].compute_hash();
            state.entries[2].entry_hash = rehashed;
        }
        // Entry 2 is self-consistent now, but entry 3 still points at the
        // original hash.
        assert!(ledger.verify_chain(2, 2));
        assert!(!ledger.verify_chain(2, 3));
        assert!(!ledger.verify_chain(3, 4));
    }

    #[test]
    fn out_of_range_verification_is_an_error() {
        let ledger = seeded(2);
        assert!(matches!(
            ledger.verify_range(0, 5),
            Err(LedgerError::InvalidRange { .. })
        ));
        assert!(!ledger.verify_chain(1, 0));
        assert!(InMemoryAuditLedger::new().verify_all().is_ok());
    }

    // ----- Queries -----

    #[test]
    fn queries_filter_by_actor_subject_and_time() {
        let ledger = InMemoryAuditLedger::new();
        ledger.append(event("alice", AuditAction::UploadBegun, "f1")).unwrap();
        ledger.append(event("bob", AuditAction::AccessDenied, "f1")).unwrap();
        ledger.append(event("alice", AuditAction::FileCommitted, "f2")).unwrap();

        let alice = ledger.by_actor(&ActorId::new("alice").unwrap()).unwrap();
        assert_eq!(alice.len(), 2);

        let f1 = ledger.by_subject(SubjectType::FileObject, "f1").unwrap();
        assert_eq!(f1.len(), 2);

        let all = ledger.read_all().unwrap();
        let window = ledger
            .by_time_range(all[0].timestamp, all[2].timestamp)
            .unwrap();
        assert_eq!(window.len(), 3);

        let denied = ledger
            .query(&AuditFilter::new().action(AuditAction::AccessDenied))
            .unwrap();
        assert_eq!(denied[0].actor_id.as_str(), "bob");
        // Reads never move the chain.
        assert_eq!(ledger.entry_count().unwrap(), 3);
    }
}
