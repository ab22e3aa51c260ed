use ebdms_types::{Checksum, ChecksumAlgorithm};
use sha2::{Digest, Sha256};

/// Incremental payload hasher.
///
/// Payloads arrive as a stream of chunks, so the hasher is fed piecewise and
/// finalized once. The algorithm is chosen by configuration; the resulting
/// [`Checksum`] carries its algorithm tag so digests from different
/// algorithms never compare equal.
pub enum PayloadHasher {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl PayloadHasher {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            ChecksumAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        match self {
            Self::Sha256(_) => ChecksumAlgorithm::Sha256,
            Self::Blake3(_) => ChecksumAlgorithm::Blake3,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(chunk),
            Self::Blake3(h) => {
                h.update(chunk);
            }
        }
    }

    pub fn finalize(self) -> Checksum {
        match self {
            Self::Sha256(h) => {
                let digest: [u8; 32] = h.finalize().into();
                Checksum::new(ChecksumAlgorithm::Sha256, digest)
            }
            Self::Blake3(h) => Checksum::new(ChecksumAlgorithm::Blake3, *h.finalize().as_bytes()),
        }
    }

    /// One-shot checksum of a complete buffer.
    pub fn checksum(algorithm: ChecksumAlgorithm, data: &[u8]) -> Checksum {
        let mut hasher = Self::new(algorithm);
        hasher.update(data);
        hasher.finalize()
    }

    /// Verify that `data` produces `expected` under `expected`'s algorithm.
    pub fn verify(data: &[u8], expected: &Checksum) -> bool {
        Self::checksum(expected.algorithm, data) == *expected
    }
}
