//! Catalog store adapter for EBDMS.
//!
//! The catalog is the relational side of two-phase registration: it holds
//! file rows and their upload state, the metadata records that reference
//! files, and the links binding index files to primaries. It never holds
//! payload bytes.
//!
//! # Guarantees
//!
//! - **State transitions** are compare-and-set against the expected prior
//!   state; a stale caller gets `ConflictingState` instead of overwriting.
//! - **References** may only point at COMMITTED files. Commit, tombstone,
//!   and reference creation are single transactions, so no observer ever
//!   sees a reference to a file that is not COMMITTED.
//! - **Index links** are unique per (primary, format); replacing one
//!   tombstones the previous link in the same transaction.
//!
//! # Modules
//!
//! - [`error`]: [`CatalogError`] and the `Result` alias
//! - [`traits`]: the [`CatalogStore`] trait, [`FilePatch`], [`FileQuery`],
//!   [`CommitOutcome`]
//! - [`memory`]: [`InMemoryCatalog`] for tests and embedding

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{CatalogError, Result};
pub use memory::InMemoryCatalog;
pub use traits::{CatalogStore, CommitOutcome, FilePatch, FileQuery, LinkReplacement};
