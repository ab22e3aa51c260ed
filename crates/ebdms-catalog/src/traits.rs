//! The [`CatalogStore`] trait defining the relational catalog interface.
//!
//! Any backend (in-memory, SQL database) implements this trait. Every
//! method is one transaction; methods that touch several rows must run at
//! snapshot or serializable isolation.

use async_trait::async_trait;
use ebdms_types::{
    Checksum, FileId, FileKind, FileObject, IndexLink, MetadataRecord, ObjectKey, Project,
    ProjectId, RecordId, UploadState,
};

use crate::error::Result;

/// Column updates applied together with a state transition.
#[derive(Clone, Debug, Default)]
pub struct FilePatch {
    pub checksum: Option<Checksum>,
    pub size_bytes: Option<u64>,
}

impl FilePatch {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn stored(checksum: Checksum, size_bytes: u64) -> Self {
        Self {
            checksum: Some(checksum),
            size_bytes: Some(size_bytes),
        }
    }
}

/// Filter for [`CatalogStore::query_files`]. Only visible (COMMITTED) files
/// are ever returned.
#[derive(Clone, Debug, Default)]
pub struct FileQuery {
    pub project_id: Option<ProjectId>,
    pub file_kind: Option<FileKind>,
}

impl FileQuery {
    pub fn project(project_id: ProjectId) -> Self {
        Self {
            project_id: Some(project_id),
            file_kind: None,
        }
    }

    pub fn matches(&self, file: &FileObject) -> bool {
        file.upload_state.is_visible()
            && self.project_id.as_ref().map_or(true, |p| *p == file.project_id)
            && self.file_kind.map_or(true, |k| k == file.file_kind)
    }
}

/// Result of [`CatalogStore::replace_index_link`].
#[derive(Clone, Debug)]
pub struct LinkReplacement {
    pub active: IndexLink,
    /// The link that was tombstoned to make room, if any.
    pub replaced: Option<IndexLink>,
}

/// Result of [`CatalogStore::commit_file`]: the row after the transaction
/// and which of its effects this call actually applied.
#[derive(Clone, Debug)]
pub struct CommitOutcome {
    pub file: FileObject,
    /// STORED -> COMMITTED happened in this call.
    pub transitioned: bool,
    /// The reference was not present before this call.
    pub reference_added: bool,
}

/// Transactional store for file rows, metadata records, and index links.
///
/// Implementations must be thread-safe and guarantee:
///
/// - state transitions are compare-and-set on the expected prior state;
/// - no record ever references a file that is not COMMITTED, including
///   while that file is being tombstoned;
/// - at most one ACTIVE index link per (primary, format).
#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    // ----- Projects -----

    async fn register_project(&self, project: Project) -> Result<()>;

    async fn get_project(&self, project_id: &ProjectId) -> Result<Option<Project>>;

    /// Bytes held by the project's PENDING, STORED, and COMMITTED files.
    async fn project_usage(&self, project_id: &ProjectId) -> Result<u64>;

    // ----- Files -----

    /// Insert a PENDING row. With `quota_ceiling` set, the insert fails with
    /// `QuotaExceeded` when current usage plus the row's declared size would
    /// exceed it; the check and insert are one transaction.
    async fn insert_file(&self, file: FileObject, quota_ceiling: Option<u64>) -> Result<()>;

    async fn get_file(&self, file_id: &FileId) -> Result<Option<FileObject>>;

    async fn get_file_by_key(&self, key: &ObjectKey) -> Result<Option<FileObject>>;

    /// Move a file from `expected` to `next`, applying `patch`.
    ///
    /// Fails with `ConflictingState` if the stored state is not `expected`
    /// and with `InvalidTransition` if `expected -> next` is not an edge.
    async fn transition(
        &self,
        file_id: &FileId,
        expected: UploadState,
        next: UploadState,
        patch: FilePatch,
    ) -> Result<FileObject>;

    /// STORED -> COMMITTED and, when `reference` is given, add the file to
    /// that record, atomically. Already COMMITTED is success (the
    /// reference is added if missing); the outcome says which effects
    /// this call applied, so redeliveries can be told apart.
    async fn commit_file(&self, file_id: &FileId, reference: Option<RecordId>) -> Result<CommitOutcome>;

    /// COMMITTED -> TOMBSTONED, dropping every record reference and
    /// tombstoning every active index link that involves the file.
    async fn tombstone_file(&self, file_id: &FileId, reason: &str) -> Result<FileObject>;

    /// Visible files matching `query`.
    async fn query_files(&self, query: &FileQuery) -> Result<Vec<FileObject>>;

    // ----- Records -----

    /// Insert a record. Any initial references must point at COMMITTED files.
    async fn insert_record(&self, record: MetadataRecord) -> Result<()>;

    async fn get_record(&self, record_id: &RecordId) -> Result<Option<MetadataRecord>>;

    /// Add `file_id` to a record; the file must be COMMITTED.
    async fn add_reference(&self, record_id: &RecordId, file_id: &FileId) -> Result<MetadataRecord>;

    async fn records_referencing(&self, file_id: &FileId) -> Result<Vec<MetadataRecord>>;

    // ----- Index links -----

    /// Validate and insert `link`, tombstoning any active link with the same
    /// (primary, format). Validation runs inside the transaction: both files
    /// COMMITTED, index kind matching the primary, same project.
    async fn replace_index_link(&self, link: IndexLink) -> Result<LinkReplacement>;

    /// Active links whose primary is `primary_id`.
    async fn active_links(&self, primary_id: &FileId) -> Result<Vec<IndexLink>>;

    /// Every link, active or not, involving `file_id` on either side.
    async fn links_for(&self, file_id: &FileId) -> Result<Vec<IndexLink>>;
}
