//! Cryptographic primitives for EBDMS.
//!
//! Provides streaming payload checksums (SHA-256 or BLAKE3, chosen by
//! configuration) and the domain-separated BLAKE3 hash chain behind the
//! audit ledger.
//!
//! All crypto operations wrap established libraries.

pub mod chain;
pub mod hasher;

pub use chain::{CanonicalEncoder, ChainError, ChainLink, HashChainVerifier, GENESIS_PREV_HASH};
pub use hasher::PayloadHasher;
