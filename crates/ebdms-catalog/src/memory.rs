//! In-memory catalog for testing and embedding.
//!
//! [`InMemoryCatalog`] keeps every table behind one `RwLock`, so each trait
//! method observes and mutates a single consistent snapshot. That gives the
//! serializable isolation the registration protocol needs without any
//! cross-row locking scheme.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ebdms_types::{
    FileId, FileObject, IndexLink, LinkId, LinkState, MetadataRecord, ObjectKey, Project,
    ProjectId, RecordId, UploadState,
};

use crate::error::{CatalogError, Result};
use crate::traits::{CatalogStore, CommitOutcome, FilePatch, FileQuery, LinkReplacement};

#[derive(Default)]
struct CatalogState {
    projects: BTreeMap<ProjectId, Project>,
    files: HashMap<FileId, FileObject>,
    keys: HashMap<ObjectKey, FileId>,
    records: BTreeMap<RecordId, MetadataRecord>,
    links: BTreeMap<LinkId, IndexLink>,
}

impl CatalogState {
    fn file(&self, file_id: &FileId) -> Result<&FileObject> {
        self.files
            .get(file_id)
            .ok_or_else(|| CatalogError::not_found("file", file_id))
    }

    fn file_mut(&mut self, file_id: &FileId) -> Result<&mut FileObject> {
        self.files
            .get_mut(file_id)
            .ok_or_else(|| CatalogError::not_found("file", file_id))
    }

    fn usage(&self, project_id: &ProjectId) -> u64 {
        self.files
            .values()
            .filter(|f| f.project_id == *project_id && f.upload_state.counts_toward_quota())
            .map(|f| f.size_bytes)
            .sum()
    }

    /// A record may reference `file_id` only if it is COMMITTED and in the
    /// record's project.
    fn check_referenceable(&self, project_id: &ProjectId, file_id: &FileId) -> Result<()> {
        let file = self.file(file_id)?;
        if !file.is_committed() {
            return Err(CatalogError::NotCommitted {
                file_id: *file_id,
                state: file.upload_state,
            });
        }
        if file.project_id != *project_id {
            return Err(CatalogError::CrossProject {
                left: format!("record in project {project_id}"),
                right: format!("file {file_id} in project {}", file.project_id),
            });
        }
        Ok(())
    }

    /// Returns the record and whether the reference is new.
    fn add_reference(&mut self, record_id: &RecordId, file_id: &FileId) -> Result<(MetadataRecord, bool)> {
        let project_id = self
            .records
            .get(record_id)
            .map(|r| r.project_id.clone())
            .ok_or_else(|| CatalogError::not_found("record", record_id))?;
        self.check_referenceable(&project_id, file_id)?;

        let record = self
            .records
            .get_mut(record_id)
            .ok_or_else(|| CatalogError::not_found("record", record_id))?;
        let added = record.file_refs.insert(*file_id);
        if added {
            record.updated_at = Utc::now();
        }
        Ok((record.clone(), added))
    }

    fn validate_link(&self, link: &IndexLink) -> Result<()> {
        let primary = self.file(&link.primary_id)?;
        let index = self.file(&link.index_id)?;

        if !primary.file_kind.is_primary() {
            return Err(CatalogError::IncompatibleIndex {
                reason: format!("{} is a {} file, not a primary", primary.file_id, primary.file_kind),
            });
        }
        if !primary.is_committed() {
            return Err(CatalogError::PrimaryNotCommitted {
                file_id: primary.file_id,
                state: primary.upload_state,
            });
        }
        if !index.is_committed() {
            return Err(CatalogError::IndexNotCommitted {
                file_id: index.file_id,
                state: index.upload_state,
            });
        }
        let spec = match (&index.index_spec, index.is_index()) {
            (Some(spec), true) => spec,
            _ => {
                return Err(CatalogError::IncompatibleIndex {
                    reason: format!("{} is not an index file", index.file_id),
                })
            }
        };
        if !spec.is_compatible_with(primary.file_kind) {
            return Err(CatalogError::IncompatibleIndex {
                reason: format!(
                    "index built for {} cannot attach to a {} file",
                    spec.target, primary.file_kind
                ),
            });
        }
        if spec.format != link.format {
            return Err(CatalogError::IncompatibleIndex {
                reason: format!("link format {} differs from index format {}", link.format, spec.format),
            });
        }
        if primary.project_id != index.project_id {
            return Err(CatalogError::CrossProject {
                left: format!("primary {}", primary.file_id),
                right: format!("index {}", index.file_id),
            });
        }
        Ok(())
    }
}

/// An in-memory implementation of [`CatalogStore`].
///
/// Fault injection: [`fail_next`](Self::fail_next) makes the next calls
/// fail as unavailable, [`conflict_next`](Self::conflict_next) makes the
/// next `commit_file` calls lose a serialization race.
#[derive(Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
    fail_next: AtomicU32,
    conflict_next: AtomicU32,
    latency_ms: AtomicU64,
}

impl InMemoryCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail with [`CatalogError::Unavailable`].
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` `commit_file` calls fail with
    /// [`CatalogError::ConflictingState`] without touching any row.
    pub fn conflict_next(&self, n: u32) {
        self.conflict_next.store(n, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn preflight(&self, op: &str) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if take_one(&self.fail_next) {
            return Err(CatalogError::Unavailable(format!("injected fault in {op}")));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, CatalogState>> {
        self.state.read().map_err(|_| CatalogError::LockPoisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, CatalogState>> {
        self.state.write().map_err(|_| CatalogError::LockPoisoned)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn register_project(&self, project: Project) -> Result<()> {
        self.preflight("register_project").await?;
        let mut state = self.write()?;
        if state.projects.contains_key(&project.project_id) {
            return Err(CatalogError::AlreadyExists {
                entity: "project",
                id: project.project_id.to_string(),
            });
        }
        state.projects.insert(project.project_id.clone(), project);
        Ok(())
    }

    async fn get_project(&self, project_id: &ProjectId) -> Result<Option<Project>> {
        self.preflight("get_project").await?;
        Ok(self.read()?.projects.get(project_id).cloned())
    }

    async fn project_usage(&self, project_id: &ProjectId) -> Result<u64> {
        self.preflight("project_usage").await?;
        Ok(self.read()?.usage(project_id))
    }

    async fn insert_file(&self, file: FileObject, quota_ceiling: Option<u64>) -> Result<()> {
        self.preflight("insert_file").await?;
        let mut state = self.write()?;
        if state.files.contains_key(&file.file_id) || state.keys.contains_key(&file.object_key) {
            return Err(CatalogError::AlreadyExists {
                entity: "file",
                id: file.file_id.to_string(),
            });
        }
        if let Some(ceiling) = quota_ceiling {
            let usage = state.usage(&file.project_id);
            if usage.saturating_add(file.size_bytes) > ceiling {
                return Err(CatalogError::QuotaExceeded {
                    usage,
                    requested: file.size_bytes,
                    ceiling,
                });
            }
        }
        state.keys.insert(file.object_key.clone(), file.file_id);
        state.files.insert(file.file_id, file);
        Ok(())
    }

    async fn get_file(&self, file_id: &FileId) -> Result<Option<FileObject>> {
        self.preflight("get_file").await?;
        Ok(self.read()?.files.get(file_id).cloned())
    }

    async fn get_file_by_key(&self, key: &ObjectKey) -> Result<Option<FileObject>> {
        self.preflight("get_file_by_key").await?;
        let state = self.read()?;
        Ok(state
            .keys
            .get(key)
            .and_then(|id| state.files.get(id))
            .cloned())
    }

    async fn transition(
        &self,
        file_id: &FileId,
        expected: UploadState,
        next: UploadState,
        patch: FilePatch,
    ) -> Result<FileObject> {
        self.preflight("transition").await?;
        let mut state = self.write()?;
        let file = state.file_mut(file_id)?;
        if file.upload_state != expected {
            return Err(CatalogError::ConflictingState {
                file_id: *file_id,
                expected,
                actual: file.upload_state,
            });
        }
        file.upload_state = expected.transition(next)?;
        if let Some(checksum) = patch.checksum {
            file.checksum = Some(checksum);
        }
        if let Some(size) = patch.size_bytes {
            file.size_bytes = size;
        }
        file.updated_at = Utc::now();
        file.version += 1;
        Ok(file.clone())
    }

    async fn commit_file(&self, file_id: &FileId, reference: Option<RecordId>) -> Result<CommitOutcome> {
        self.preflight("commit_file").await?;
        let mut state = self.write()?;
        let current = state.file(file_id)?.upload_state;

        if take_one(&self.conflict_next) {
            return Err(CatalogError::ConflictingState {
                file_id: *file_id,
                expected: UploadState::Stored,
                actual: current,
            });
        }

        match current {
            UploadState::Stored | UploadState::Committed => {}
            actual => {
                return Err(CatalogError::ConflictingState {
                    file_id: *file_id,
                    expected: UploadState::Stored,
                    actual,
                })
            }
        }

        // Validate the reference before any mutation so a bad record id
        // leaves the row STORED.
        if let Some(record_id) = &reference {
            let record = state
                .records
                .get(record_id)
                .ok_or_else(|| CatalogError::not_found("record", record_id))?;
            let file = state.file(file_id)?;
            if record.project_id != file.project_id {
                return Err(CatalogError::CrossProject {
                    left: format!("record {record_id}"),
                    right: format!("file {file_id}"),
                });
            }
        }

        let transitioned = current == UploadState::Stored;
        if transitioned {
            let file = state.file_mut(file_id)?;
            file.upload_state = current.transition(UploadState::Committed)?;
            file.updated_at = Utc::now();
            file.version += 1;
        }
        let mut reference_added = false;
        if let Some(record_id) = &reference {
            reference_added = state.add_reference(record_id, file_id)?.1;
        }
        Ok(CommitOutcome {
            file: state.file(file_id)?.clone(),
            transitioned,
            reference_added,
        })
    }

    async fn tombstone_file(&self, file_id: &FileId, reason: &str) -> Result<FileObject> {
        self.preflight("tombstone_file").await?;
        let mut state = self.write()?;
        let current = state.file(file_id)?.upload_state;
        let next = current.transition(UploadState::Tombstoned)?;
        let now = Utc::now();

        for record in state.records.values_mut() {
            if record.file_refs.remove(file_id) {
                record.updated_at = now;
            }
        }
        for link in state.links.values_mut() {
            if link.is_active() && link.involves(file_id) {
                link.state = LinkState::Tombstoned;
                link.tombstoned_at = Some(now);
            }
        }

        let file = state.file_mut(file_id)?;
        file.upload_state = next;
        file.tombstone_reason = Some(reason.to_string());
        file.updated_at = now;
        file.version += 1;
        Ok(file.clone())
    }

    async fn query_files(&self, query: &FileQuery) -> Result<Vec<FileObject>> {
        self.preflight("query_files").await?;
        let state = self.read()?;
        let mut files: Vec<FileObject> = state
            .files
            .values()
            .filter(|f| query.matches(f))
            .cloned()
            .collect();
        files.sort_by_key(|f| f.file_id);
        Ok(files)
    }

    async fn insert_record(&self, record: MetadataRecord) -> Result<()> {
        self.preflight("insert_record").await?;
        let mut state = self.write()?;
        if state.records.contains_key(&record.record_id) {
            return Err(CatalogError::AlreadyExists {
                entity: "record",
                id: record.record_id.to_string(),
            });
        }
        if !state.projects.contains_key(&record.project_id) {
            return Err(CatalogError::not_found("project", &record.project_id));
        }
        for file_id in &record.file_refs {
            state.check_referenceable(&record.project_id, file_id)?;
        }
        state.records.insert(record.record_id, record);
        Ok(())
    }

    async fn get_record(&self, record_id: &RecordId) -> Result<Option<MetadataRecord>> {
        self.preflight("get_record").await?;
        Ok(self.read()?.records.get(record_id).cloned())
    }

    async fn add_reference(&self, record_id: &RecordId, file_id: &FileId) -> Result<MetadataRecord> {
        self.preflight("add_reference").await?;
        Ok(self.write()?.add_reference(record_id, file_id)?.0)
    }

    async fn records_referencing(&self, file_id: &FileId) -> Result<Vec<MetadataRecord>> {
        self.preflight("records_referencing").await?;
        Ok(self
            .read()?
            .records
            .values()
            .filter(|r| r.references(file_id))
            .cloned()
            .collect())
    }

    async fn replace_index_link(&self, link: IndexLink) -> Result<LinkReplacement> {
        self.preflight("replace_index_link").await?;
        let mut state = self.write()?;
        state.validate_link(&link)?;

        let existing = state
            .links
            .values()
            .find(|l| l.is_active() && l.primary_id == link.primary_id && l.format == link.format)
            .cloned();

        if let Some(current) = &existing {
            if current.index_id == link.index_id {
                return Ok(LinkReplacement {
                    active: current.clone(),
                    replaced: None,
                });
            }
        }

        let replaced = match existing {
            Some(current) => {
                let previous = state
                    .links
                    .get_mut(&current.link_id)
                    .ok_or_else(|| CatalogError::not_found("index link", current.link_id))?;
                previous.state = LinkState::Tombstoned;
                previous.tombstoned_at = Some(Utc::now());
                Some(previous.clone())
            }
            None => None,
        };

        state.links.insert(link.link_id, link.clone());
        Ok(LinkReplacement {
            active: link,
            replaced,
        })
    }

    async fn active_links(&self, primary_id: &FileId) -> Result<Vec<IndexLink>> {
        self.preflight("active_links").await?;
        Ok(self
            .read()?
            .links
            .values()
            .filter(|l| l.is_active() && l.primary_id == *primary_id)
            .cloned()
            .collect())
    }

    async fn links_for(&self, file_id: &FileId) -> Result<Vec<IndexLink>> {
        self.preflight("links_for").await?;
        Ok(self
            .read()?
            .links
            .values()
            .filter(|l| l.involves(file_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebdms_types::{
        ActorId, Checksum, ChecksumAlgorithm, FileKind, IndexFormat, IndexSpec, RecordKind,
    };

    fn project() -> ProjectId {
        ProjectId::new("P1").unwrap()
    }

    fn actor() -> ActorId {
        ActorId::new("alice").unwrap()
    }

    fn pending(kind: FileKind, size: u64) -> FileObject {
        let id = FileId::new();
        let key = ObjectKey::allocate("omics", &project(), &id, Utc::now());
        FileObject::pending(id, key, project(), kind, size, actor())
    }

    async fn catalog() -> InMemoryCatalog {
        let catalog = InMemoryCatalog::new();
        catalog
            .register_project(Project::new(project(), "P1", "Pilot"))
            .await
            .unwrap();
        catalog
    }

    async fn committed(catalog: &InMemoryCatalog, mut file: FileObject) -> FileObject {
        if file.is_index() && file.index_spec.is_none() {
            file.index_spec = Some(IndexSpec::new(IndexFormat::Tbi, FileKind::Vcf).unwrap());
        }
        let id = file.file_id;
        catalog.insert_file(file, None).await.unwrap();
        catalog
            .transition(
                &id,
                UploadState::Pending,
                UploadState::Stored,
                FilePatch::stored(Checksum::new(ChecksumAlgorithm::Sha256, [1; 32]), 10),
            )
            .await
            .unwrap();
        catalog.commit_file(&id, None).await.unwrap().file
    }

    // ----- Files and transitions -----

    #[tokio::test]
    async fn insert_and_lookup_by_key() {
        let catalog = catalog().await;
        let file = pending(FileKind::Vcf, 100);
        catalog.insert_file(file.clone(), None).await.unwrap();

        let by_key = catalog.get_file_by_key(&file.object_key).await.unwrap();
        assert_eq!(by_key.unwrap().file_id, file.file_id);
        assert!(matches!(
            catalog.insert_file(file, None).await,
            Err(CatalogError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let catalog = catalog().await;
        let file = pending(FileKind::Vcf, 100);
        let id = file.file_id;
        catalog.insert_file(file, None).await.unwrap();

        let stored = catalog
            .transition(&id, UploadState::Pending, UploadState::Stored, FilePatch::none())
            .await
            .unwrap();
        assert_eq!(stored.upload_state, UploadState::Stored);
        assert_eq!(stored.version, 2);

        let err = catalog
            .transition(&id, UploadState::Pending, UploadState::Failed, FilePatch::none())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::ConflictingState {
                actual: UploadState::Stored,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn illegal_edge_is_rejected() {
        let catalog = catalog().await;
        let file = pending(FileKind::Bed, 1);
        let id = file.file_id;
        catalog.insert_file(file, None).await.unwrap();
        let err = catalog
            .transition(&id, UploadState::Pending, UploadState::Committed, FilePatch::none())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn quota_check_is_part_of_insert() {
        let catalog = catalog().await;
        catalog
            .insert_file(pending(FileKind::Vcf, 600), Some(1000))
            .await
            .unwrap();
        let err = catalog
            .insert_file(pending(FileKind::Vcf, 500), Some(1000))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::QuotaExceeded {
                usage: 600,
                requested: 500,
                ceiling: 1000
            }
        ));
        assert_eq!(catalog.project_usage(&project()).await.unwrap(), 600);
    }

    #[tokio::test]
    async fn failed_files_release_quota_and_stay_hidden() {
        let catalog = catalog().await;
        let file = pending(FileKind::Vcf, 600);
        let id = file.file_id;
        catalog.insert_file(file, None).await.unwrap();
        catalog
            .transition(&id, UploadState::Pending, UploadState::Failed, FilePatch::none())
            .await
            .unwrap();

        assert_eq!(catalog.project_usage(&project()).await.unwrap(), 0);
        let visible = catalog.query_files(&FileQuery::project(project())).await.unwrap();
        assert!(visible.is_empty());
    }

    // ----- Commit -----

    #[tokio::test]
    async fn commit_adds_reference_atomically() {
        let catalog = catalog().await;
        let record = MetadataRecord::new(project(), RecordKind::Sample, "S-1");
        let record_id = record.record_id;
        catalog.insert_record(record).await.unwrap();

        let file = pending(FileKind::Vcf, 10);
        let id = file.file_id;
        catalog.insert_file(file, None).await.unwrap();
        catalog
            .transition(&id, UploadState::Pending, UploadState::Stored, FilePatch::none())
            .await
            .unwrap();

        let committed = catalog.commit_file(&id, Some(record_id)).await.unwrap();
        assert!(committed.file.is_committed());
        assert!(committed.transitioned);
        assert!(committed.reference_added);
        let record = catalog.get_record(&record_id).await.unwrap().unwrap();
        assert!(record.references(&id));

        // Idempotent on redelivery, and says so.
        let again = catalog.commit_file(&id, Some(record_id)).await.unwrap();
        assert_eq!(again.file.version, committed.file.version);
        assert!(!again.transitioned);
        assert!(!again.reference_added);
    }

    #[tokio::test]
    async fn recommit_reports_only_the_new_reference() {
        let catalog = catalog().await;
        let record = MetadataRecord::new(project(), RecordKind::Sample, "S-2");
        let record_id = record.record_id;
        catalog.insert_record(record).await.unwrap();
        let id = committed(&catalog, pending(FileKind::Bed, 10)).await.file_id;

        let outcome = catalog.commit_file(&id, Some(record_id)).await.unwrap();
        assert!(!outcome.transitioned);
        assert!(outcome.reference_added);
    }

    #[tokio::test]
    async fn commit_with_unknown_record_leaves_file_stored() {
        let catalog = catalog().await;
        let file = pending(FileKind::Vcf, 10);
        let id = file.file_id;
        catalog.insert_file(file, None).await.unwrap();
        catalog
            .transition(&id, UploadState::Pending, UploadState::Stored, FilePatch::none())
            .await
            .unwrap();

        let err = catalog.commit_file(&id, Some(RecordId::new())).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
        let file = catalog.get_file(&id).await.unwrap().unwrap();
        assert_eq!(file.upload_state, UploadState::Stored);
    }

    #[tokio::test]
    async fn commit_from_pending_conflicts() {
        let catalog = catalog().await;
        let file = pending(FileKind::Vcf, 10);
        let id = file.file_id;
        catalog.insert_file(file, None).await.unwrap();
        assert!(matches!(
            catalog.commit_file(&id, None).await,
            Err(CatalogError::ConflictingState {
                actual: UploadState::Pending,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn injected_conflict_does_not_touch_the_row() {
        let catalog = catalog().await;
        let file = pending(FileKind::Vcf, 10);
        let id = file.file_id;
        catalog.insert_file(file, None).await.unwrap();
        catalog
            .transition(&id, UploadState::Pending, UploadState::Stored, FilePatch::none())
            .await
            .unwrap();

        catalog.conflict_next(1);
        assert!(catalog.commit_file(&id, None).await.is_err());
        let file = catalog.get_file(&id).await.unwrap().unwrap();
        assert_eq!(file.upload_state, UploadState::Stored);
        assert!(catalog.commit_file(&id, None).await.unwrap().file.is_committed());
    }

    // ----- References -----

    #[tokio::test]
    async fn references_require_committed_files() {
        let catalog = catalog().await;
        let record = MetadataRecord::new(project(), RecordKind::Participant, "PT-1");
        let record_id = record.record_id;
        catalog.insert_record(record).await.unwrap();

        let file = pending(FileKind::Vcf, 10);
        let id = file.file_id;
        catalog.insert_file(file, None).await.unwrap();
        assert!(matches!(
            catalog.add_reference(&record_id, &id).await,
            Err(CatalogError::NotCommitted { .. })
        ));

        let mut dangling = MetadataRecord::new(project(), RecordKind::Sample, "S-2");
        dangling.file_refs.insert(id);
        assert!(catalog.insert_record(dangling).await.is_err());
    }

    #[tokio::test]
    async fn tombstone_removes_references_and_links() {
        let catalog = catalog().await;
        let primary = committed(&catalog, pending(FileKind::Vcf, 10)).await;
        let index = committed(&catalog, pending(FileKind::Index, 1)).await;

        let record = MetadataRecord::new(project(), RecordKind::Sample, "S-1");
        let record_id = record.record_id;
        catalog.insert_record(record).await.unwrap();
        catalog.add_reference(&record_id, &primary.file_id).await.unwrap();
        catalog
            .replace_index_link(IndexLink::new(
                primary.file_id,
                index.file_id,
                IndexFormat::Tbi,
                actor(),
            ))
            .await
            .unwrap();

        let tombstoned = catalog
            .tombstone_file(&primary.file_id, "withdrawn consent")
            .await
            .unwrap();
        assert_eq!(tombstoned.upload_state, UploadState::Tombstoned);
        assert_eq!(tombstoned.tombstone_reason.as_deref(), Some("withdrawn consent"));
        assert!(catalog
            .records_referencing(&primary.file_id)
            .await
            .unwrap()
            .is_empty());
        assert!(catalog.active_links(&primary.file_id).await.unwrap().is_empty());
        assert_eq!(catalog.links_for(&primary.file_id).await.unwrap().len(), 1);

        // Tombstoning twice is not an edge.
        assert!(matches!(
            catalog.tombstone_file(&primary.file_id, "again").await,
            Err(CatalogError::InvalidTransition(_))
        ));
    }

    // ----- Index links -----

    #[tokio::test]
    async fn replacing_index_keeps_one_active_link() {
        let catalog = catalog().await;
        let primary = committed(&catalog, pending(FileKind::Vcf, 10)).await;
        let first = committed(&catalog, pending(FileKind::Index, 1)).await;
        let second = committed(&catalog, pending(FileKind::Index, 1)).await;

        let a = catalog
            .replace_index_link(IndexLink::new(primary.file_id, first.file_id, IndexFormat::Tbi, actor()))
            .await
            .unwrap();
        assert!(a.replaced.is_none());

        let b = catalog
            .replace_index_link(IndexLink::new(primary.file_id, second.file_id, IndexFormat::Tbi, actor()))
            .await
            .unwrap();
        assert_eq!(b.replaced.unwrap().link_id, a.active.link_id);

        let active = catalog.active_links(&primary.file_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].index_id, second.file_id);
    }

    #[tokio::test]
    async fn link_to_stored_primary_is_rejected() {
        let catalog = catalog().await;
        let primary = pending(FileKind::Vcf, 10);
        let primary_id = primary.file_id;
        catalog.insert_file(primary, None).await.unwrap();
        catalog
            .transition(&primary_id, UploadState::Pending, UploadState::Stored, FilePatch::none())
            .await
            .unwrap();
        let index = committed(&catalog, pending(FileKind::Index, 1)).await;

        let err = catalog
            .replace_index_link(IndexLink::new(primary_id, index.file_id, IndexFormat::Tbi, actor()))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::PrimaryNotCommitted { .. }));
    }

    #[tokio::test]
    async fn index_for_another_kind_is_incompatible() {
        let catalog = catalog().await;
        let primary = committed(&catalog, pending(FileKind::Vcf, 10)).await;
        let mut bed_index = pending(FileKind::Index, 1);
        bed_index.index_spec = Some(IndexSpec::new(IndexFormat::Tbi, FileKind::Bed).unwrap());
        let bed_index = committed(&catalog, bed_index).await;

        let err = catalog
            .replace_index_link(IndexLink::new(primary.file_id, bed_index.file_id, IndexFormat::Tbi, actor()))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::IncompatibleIndex { .. }));
    }

    // ----- Fault injection -----

    #[tokio::test]
    async fn fail_next_is_transient() {
        let catalog = catalog().await;
        catalog.fail_next(1);
        let err = catalog.get_project(&project()).await.unwrap_err();
        assert!(err.is_transient());
        assert!(catalog.get_project(&project()).await.unwrap().is_some());
    }
}
