//! Object storage adapter for EBDMS.
//!
//! Genomic payloads live only in an S3-style object service; the catalog
//! never sees their bytes. This crate defines the uniform interface the
//! registration engine drives and an in-memory implementation for tests and
//! embedding.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`]: `HashMap`-based store with fault injection
//!
//! # Design Rules
//!
//! 1. An object is visible only after `put` or `complete_multipart` returns.
//! 2. Parts of a multipart upload may be sent concurrently, in any order.
//! 3. The store never interprets object contents.
//! 4. Transient failures are distinguishable ([`StoreError::is_transient`])
//!    so callers can retry them with backoff.

pub mod error;
pub mod memory;
pub mod multipart;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use multipart::{
    collect_payload, payload_from_bytes, MultipartUploader, PayloadStream, UploadSummary,
    DEFAULT_PART_SIZE,
};
pub use traits::{CompletedPart, ObjectMeta, ObjectStore, UploadId};
