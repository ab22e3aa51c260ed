/// `prev_hash` of the entry at sequence 0.
pub const GENESIS_PREV_HASH: [u8; 32] = [0u8; 32];

const CHAIN_DOMAIN: &[u8] = b"ebdms-audit-v1:";

/// Trait for records that participate in a hash chain.
pub trait ChainLink {
    fn sequence(&self) -> u64;
    /// The record's own hash.
    fn entry_hash(&self) -> [u8; 32];
    /// The previous record's hash ([`GENESIS_PREV_HASH`] at sequence 0).
    fn prev_hash(&self) -> [u8; 32];
    /// Canonical encoding of every hashed field except `prev_hash`.
    fn payload_bytes(&self) -> Vec<u8>;
}

/// Length-prefixed field encoder.
///
/// Each field is written as an 8-byte big-endian length followed by its
/// bytes, so no two distinct field tuples share an encoding.
#[derive(Default)]
pub struct CanonicalEncoder {
    buf: Vec<u8>,
}

impl CanonicalEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.buf.extend_from_slice(&8u64.to_be_bytes());
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn i64(mut self, value: i64) -> Self {
        self.buf.extend_from_slice(&8u64.to_be_bytes());
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn str(self, value: &str) -> Self {
        self.bytes(value.as_bytes())
    }

    pub fn opt_str(self, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.u64(1).str(v),
            None => self.u64(0),
        }
    }

    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.buf
            .extend_from_slice(&(value.len() as u64).to_be_bytes());
        self.buf.extend_from_slice(value);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Hash chain integrity verifier.
///
/// Verifies that a contiguous run of records forms a valid chain: sequence
/// numbers are dense, each `prev_hash` matches the previous record's hash,
/// and each record's hash is correctly computed from its payload.
pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Verify `records`, whose first element must link to `anchor_prev`
    /// (the hash of the record just before the run, or the genesis hash).
    pub fn verify_run(records: &[impl ChainLink], anchor_prev: [u8; 32]) -> Result<(), ChainError> {
        let mut expected_prev = anchor_prev;
        let mut expected_seq = match records.first() {
            Some(first) => first.sequence(),
            None => return Ok(()),
        };

        for record in records {
            let seq = record.sequence();
            if seq != expected_seq {
                return Err(ChainError::SequenceGap {
                    expected: expected_seq,
                    found: seq,
                });
            }
            if record.prev_hash() != expected_prev {
                return Err(ChainError::BrokenLink { seq });
            }
            let computed = Self::compute_hash(&record.payload_bytes(), &expected_prev);
            if computed != record.entry_hash() {
                return Err(ChainError::HashMismatch { seq });
            }
            expected_prev = record.entry_hash();
            expected_seq = seq + 1;
        }

        Ok(())
    }

    /// Verify a full chain starting at sequence 0.
    pub fn verify_from_genesis(records: &[impl ChainLink]) -> Result<(), ChainError> {
        if let Some(first) = records.first() {
            if first.sequence() != 0 {
                return Err(ChainError::SequenceGap {
                    expected: 0,
                    found: first.sequence(),
                });
            }
        }
        Self::verify_run(records, GENESIS_PREV_HASH)
    }

    /// `H(payload ‖ prev_hash)` with the audit domain tag.
    pub fn compute_hash(payload: &[u8], prev_hash: &[u8; 32]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CHAIN_DOMAIN);
        hasher.update(payload);
        hasher.update(prev_hash);
        *hasher.finalize().as_bytes()
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("broken link at seq {seq}: prev_hash does not match")]
    BrokenLink { seq: u64 },

    #[error("hash mismatch at seq {seq}: computed hash differs from stored")]
    HashMismatch { seq: u64 },
}

impl ChainError {
    pub fn seq(&self) -> u64 {
        match self {
            Self::SequenceGap { found, .. } => *found,
            Self::BrokenLink { seq } | Self::HashMismatch { seq } => *seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestEntry {
        seq: u64,
        hash: [u8; 32],
        prev: [u8; 32],
        payload: Vec<u8>,
    }

    impl ChainLink for TestEntry {
        fn sequence(&self) -> u64 {
            self.seq
        }
        fn entry_hash(&self) -> [u8; 32] {
            self.hash
        }
        fn prev_hash(&self) -> [u8; 32] {
            self.prev
        }
        fn payload_bytes(&self) -> Vec<u8> {
            self.payload.clone()
        }
    }

    fn build_chain(count: u64) -> Vec<TestEntry> {
        let mut chain = Vec::new();
        let mut prev = GENESIS_PREV_HASH;
        for seq in 0..count {
            let payload = CanonicalEncoder::new()
                .u64(seq)
                .str(&format!("entry-{seq}"))
                .finish();
            let hash = HashChainVerifier::compute_hash(&payload, &prev);
            chain.push(TestEntry {
                seq,
                hash,
                prev,
                payload,
            });
            prev = hash;
        }
        chain
    }

    #[test]
    fn empty_chain_is_valid() {
        let chain: Vec<TestEntry> = vec![];
        assert!(HashChainVerifier::verify_from_genesis(&chain).is_ok());
    }

    #[test]
    fn multi_entry_chain() {
        let chain = build_chain(10);
        assert!(HashChainVerifier::verify_from_genesis(&chain).is_ok());
    }

    #[test]
    fn sub_range_verifies_against_its_anchor() {
        let chain = build_chain(6);
        let anchor = chain[2].hash;
        assert!(HashChainVerifier::verify_run(&chain[3..], anchor).is_ok());
        assert_eq!(
            HashChainVerifier::verify_run(&chain[3..], [7; 32]),
            Err(ChainError::BrokenLink { seq: 3 })
        );
    }

    #[test]
    fn chain_not_starting_at_zero_is_rejected() {
        let chain = build_chain(3);
        assert_eq!(
            HashChainVerifier::verify_from_genesis(&chain[1..]),
            Err(ChainError::SequenceGap {
                expected: 0,
                found: 1
            })
        );
    }

    #[test]
    fn broken_link_detected() {
        let mut chain = build_chain(3);
        chain[2].prev = [99; 32];
        assert_eq!(
            HashChainVerifier::verify_from_genesis(&chain),
            Err(ChainError::BrokenLink { seq: 2 })
        );
    }

    #[test]
    fn tampered_payload_detected() {
        let mut chain = build_chain(3);
        chain[1].payload = b"tampered".to_vec();
        assert_eq!(
            HashChainVerifier::verify_from_genesis(&chain),
            Err(ChainError::HashMismatch { seq: 1 })
        );
    }

    #[test]
    fn encoder_separates_field_boundaries() {
        let a = CanonicalEncoder::new().str("ab").str("c").finish();
        let b = CanonicalEncoder::new().str("a").str("bc").finish();
        assert_ne!(a, b);
        let none = CanonicalEncoder::new().opt_str(None).finish();
        let empty = CanonicalEncoder::new().opt_str(Some("")).finish();
        assert_ne!(none, empty);
    }
}
