//! Append-only audit ledger for EBDMS.
//!
//! Every registration step, access decision, and deletion produces exactly
//! one [`AuditEntry`]. Entries are chained: each carries the hash of its
//! predecessor, so mutating any persisted field is detectable.
//!
//! This crate provides:
//! - [`AuditEntry`], [`AuditAction`], [`SubjectType`] and the hash rule
//! - `AuditWriter` / `AuditReader` trait boundaries with range verification
//! - [`InMemoryAuditLedger`] and the durable [`FileAuditLedger`]
//! - [`AuditFilter`] queries by actor, subject, action, and time range
//! - Full validation reports ([`AuditValidator`])

pub mod entry;
pub mod error;
pub mod file;
pub mod filter;
pub mod memory;
pub mod traits;
pub mod validation;

pub use entry::{AuditAction, AuditEntry, AuditEvent, SubjectType};
pub use error::LedgerError;
pub use file::FileAuditLedger;
pub use filter::AuditFilter;
pub use memory::InMemoryAuditLedger;
pub use traits::{AuditReader, AuditWriter};
pub use validation::{AuditValidator, ValidationReport, Violation, ViolationKind};
