//! Foundation types for EBDMS.
//!
//! This crate provides the identity, file, and catalog types shared by
//! every other EBDMS crate.
//!
//! # Key Types
//!
//! - [`FileObject`]: one immutable payload tracked through [`UploadState`]
//! - [`ObjectKey`]: UUID-derived storage path of a payload
//! - [`IndexLink`]: binds an index file to one committed primary file
//! - [`MetadataRecord`]: catalog entity referencing files by [`FileId`]
//! - [`ActorContext`]: identity facts handed over by the authentication layer

pub mod error;
pub mod file;
pub mod identity;
pub mod link;
pub mod object;
pub mod record;

pub use error::TypeError;
pub use file::{FileKind, FileObject, IndexFormat, IndexSpec, UploadState};
pub use identity::{ActorContext, ActorId, ProjectId, Role};
pub use link::{IndexLink, LinkId, LinkState};
pub use object::{Checksum, ChecksumAlgorithm, FileId, ObjectKey};
pub use record::{MetadataRecord, Project, RecordId, RecordKind};
