//! EBDMS file registration core.
//!
//! Ties the object store, catalog, audit ledger, and access gate together
//! into a two-phase registration protocol: bytes land in object storage,
//! are re-hashed, and only then become visible through a catalog commit.
//! [`Ebdms`] is the entry point for applications embedding the core.

pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod linkage;
pub mod retry;
pub mod service;

pub use config::{EngineConfig, JobConfig, QuotaConfig, RetryConfig, StorageConfig, TimeoutConfig};
pub use engine::{AuditLedger, RegistrationEngine, StagedPayload, UploadOptions, SYSTEM_ACTOR};
pub use error::{RegistryError, RegistryResult};
pub use jobs::{InProcessTaskQueue, JobEnvelope, JobWorker, RegistrationJob, TaskQueue, WorkerStats};
pub use linkage::IndexLinkManager;
pub use retry::{backoff_delay, retry_transient, RetryError, RetryingObjectStore, Transient};
pub use service::{Ebdms, FilePayload, RegisterOptions};

// Re-export key types
pub use ebdms_gate::{AccessGrant, GateConfig, MfaPolicy, MfaScope, Operation, PolicyTable};
pub use ebdms_ledger::{AuditAction, AuditEntry, AuditFilter, ValidationReport};
pub use ebdms_types::{
    ActorContext, ActorId, Checksum, ChecksumAlgorithm, FileId, FileKind, FileObject, IndexFormat,
    IndexLink, MetadataRecord, Project, ProjectId, RecordId, RecordKind, Role, UploadState,
};
