use ebdms_crypto::GENESIS_PREV_HASH;

use crate::error::LedgerError;
use crate::traits::AuditReader;

/// Result of a full ledger validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    pub entry_count: u64,
    pub hash_chain_valid: bool,
    pub sequence_dense: bool,
    pub timestamps_monotonic: bool,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// The earliest violating sequence number, if any.
    pub fn first_violation(&self) -> Option<&Violation> {
        self.violations.iter().min_by_key(|v| v.seq)
    }
}

/// A specific integrity violation detected during validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub seq: u64,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    SequenceGap,
    HashChainBreak,
    HashMismatch,
    TimestampRegression,
}

/// Ledger integrity validator.
///
/// Unlike `verify_range`, which stops at the first failure, this walks the
/// whole ledger and reports every violation it finds.
pub struct AuditValidator;

impl AuditValidator {
    pub fn validate<R: AuditReader + ?Sized>(reader: &R) -> Result<ValidationReport, LedgerError> {
        let entries = reader.read_all()?;
        let mut violations = Vec::new();
        let mut hash_chain_valid = true;
        let mut sequence_dense = true;
        let mut timestamps_monotonic = true;

        for (index, entry) in entries.iter().enumerate() {
            let expected_seq = index as u64;
            if entry.sequence_number != expected_seq {
                sequence_dense = false;
                violations.push(Violation {
                    seq: entry.sequence_number,
                    kind: ViolationKind::SequenceGap,
                    description: format!(
                        "expected seq {expected_seq}, got {}",
                        entry.sequence_number
                    ),
                });
            }

            let expected_prev = if index == 0 {
                GENESIS_PREV_HASH
            } else {
                entries[index - 1].entry_hash
            };
            if entry.prev_hash != expected_prev {
                hash_chain_valid = false;
                violations.push(Violation {
                    seq: entry.sequence_number,
                    kind: ViolationKind::HashChainBreak,
                    description: "previous hash link mismatch".into(),
                });
            }

            if entry.compute_hash() != entry.entry_hash {
                hash_chain_valid = false;
                violations.push(Violation {
                    seq: entry.sequence_number,
                    kind: ViolationKind::HashMismatch,
                    description: "entry hash does not match computed".into(),
                });
            }

            if index > 0 && entry.timestamp < entries[index - 1].timestamp {
                timestamps_monotonic = false;
                violations.push(Violation {
                    seq: entry.sequence_number,
                    kind: ViolationKind::TimestampRegression,
                    description: "timestamp earlier than previous entry".into(),
                });
            }
        }

        Ok(ValidationReport {
            entry_count: entries.len() as u64,
            hash_chain_valid,
            sequence_dense,
            timestamps_monotonic,
            violations,
        })
    }
}
