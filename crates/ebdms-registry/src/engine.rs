//! The two-phase File Registration Engine.
//!
//! Bytes go to object storage first; the catalog row only becomes visible
//! once the stored bytes have been re-hashed and the row committed. Every
//! state transition, success or failure, appends one audit entry.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::Utc;
use ebdms_catalog::{CatalogError, CatalogStore, FilePatch};
use ebdms_crypto::PayloadHasher;
use ebdms_gate::{AccessGate, AccessGrant, AccessRequest, Operation, ResourceType};
use ebdms_ledger::{AuditAction, AuditEntry, AuditEvent, AuditReader, AuditWriter, SubjectType};
use ebdms_store::{MultipartUploader, ObjectStore, PayloadStream, StoreError, UploadSummary};
use ebdms_types::{
    ActorContext, ActorId, Checksum, FileId, FileKind, FileObject, IndexSpec, ObjectKey, ProjectId,
    RecordId, UploadState,
};
use futures_util::StreamExt;

use crate::config::EngineConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::jobs::{JobEnvelope, RegistrationJob, TaskQueue};
use crate::retry::{retry_transient, RetryingObjectStore};

/// Actor recorded for work the engine does on its own behalf.
pub const SYSTEM_ACTOR: &str = "ebdms-system";

/// A ledger the engine can both append to and read back.
pub trait AuditLedger: AuditWriter + AuditReader {}

impl<T: AuditWriter + AuditReader + ?Sized> AuditLedger for T {}

/// Optional fields for [`RegistrationEngine::begin_upload`].
#[derive(Clone, Debug, Default)]
pub struct UploadOptions {
    /// Required for, and only allowed on, INDEX uploads.
    pub index_spec: Option<IndexSpec>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl UploadOptions {
    pub fn index(spec: IndexSpec) -> Self {
        Self {
            index_spec: Some(spec),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Bytes written by [`RegistrationEngine::upload_payload`] and the checksum
/// computed while they streamed through.
#[derive(Clone, Debug)]
pub struct StagedPayload {
    pub summary: UploadSummary,
    pub checksum: Checksum,
}

fn subject_type_of(resource: ResourceType) -> SubjectType {
    match resource {
        ResourceType::FileObject => SubjectType::FileObject,
        ResourceType::MetadataRecord => SubjectType::MetadataRecord,
        ResourceType::IndexLink => SubjectType::IndexLink,
        ResourceType::AuditLog => SubjectType::AuditLog,
        ResourceType::Project => SubjectType::Project,
    }
}

/// Drives a file through `PENDING -> STORED -> COMMITTED -> TOMBSTONED`.
pub struct RegistrationEngine {
    store: Arc<dyn ObjectStore>,
    /// `store` behind per-call retries, for the multipart uploader.
    part_store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn AuditLedger>,
    gate: AccessGate,
    config: EngineConfig,
    jobs: Option<Arc<dyn TaskQueue>>,
    system_actor: ActorId,
}

impl RegistrationEngine {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<dyn AuditLedger>,
        config: EngineConfig,
    ) -> RegistryResult<Self> {
        config.validate()?;
        let part_store: Arc<dyn ObjectStore> = Arc::new(RetryingObjectStore::new(
            Arc::clone(&store),
            config.retry.clone(),
            config.timeouts.storage(),
        ));
        Ok(Self {
            store,
            part_store,
            catalog,
            ledger,
            gate: AccessGate::with_default_stages(config.gate.clone()),
            config,
            jobs: None,
            system_actor: ActorId::new(SYSTEM_ACTOR)?,
        })
    }

    /// Hand purge work to `queue` instead of running it inline.
    pub fn with_task_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.jobs = Some(queue);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<dyn AuditLedger> {
        &self.ledger
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn system_actor(&self) -> &ActorId {
        &self.system_actor
    }

    // ------------------------------------------------------------------
    // Phase 1: begin, stream, verify
    // ------------------------------------------------------------------

    /// Authorize, check project and quota, and insert a PENDING row.
    pub async fn begin_upload(
        &self,
        ctx: &ActorContext,
        project_id: &ProjectId,
        file_kind: FileKind,
        declared_size: u64,
        options: UploadOptions,
    ) -> RegistryResult<FileObject> {
        let file_id = FileId::new();
        self.authorize(ctx, project_id, Operation::RegisterFile, &file_id.to_string())?;

        let result = self
            .begin_inner(ctx, project_id, file_id, file_kind, declared_size, options)
            .await;
        if let Err(e) = &result {
            self.audit_failure(&ctx.actor_id, AuditAction::UploadFailed, SubjectType::FileObject, file_id, e);
        }
        result
    }

    async fn begin_inner(
        &self,
        ctx: &ActorContext,
        project_id: &ProjectId,
        file_id: FileId,
        file_kind: FileKind,
        declared_size: u64,
        options: UploadOptions,
    ) -> RegistryResult<FileObject> {
        match (file_kind, &options.index_spec) {
            (FileKind::Index, None) => {
                return Err(RegistryError::InvalidRequest(
                    "index uploads must declare an index spec".into(),
                ))
            }
            (kind, Some(_)) if kind.is_primary() => {
                return Err(RegistryError::InvalidRequest(format!(
                    "{kind} uploads cannot carry an index spec"
                )))
            }
            _ => {}
        }

        let project = self
            .catalog_call("catalog.get_project", || self.catalog.get_project(project_id))
            .await?
            .ok_or_else(|| RegistryError::not_found("project", project_id))?;
        let now = Utc::now();
        if !project.is_active_at(now) {
            return Err(RegistryError::ProjectInactive(project_id.to_string()));
        }
        let ceiling = project.quota_bytes.or(self.config.quota.default_project_bytes);

        let object_key = ObjectKey::allocate(&self.config.storage.key_prefix, project_id, &file_id, now);
        let mut file = FileObject::pending(
            file_id,
            object_key,
            project_id.clone(),
            file_kind,
            declared_size,
            ctx.actor_id.clone(),
        );
        file.index_spec = options.index_spec;
        file.metadata = options.metadata;

        self.catalog_call("catalog.insert_file", || {
            self.catalog.insert_file(file.clone(), ceiling)
        })
        .await?;

        self.audit(
            &ctx.actor_id,
            AuditAction::UploadBegun,
            SubjectType::FileObject,
            file_id,
            Some(format!(
                "key={} kind={file_kind} declared_bytes={declared_size}",
                file.object_key
            )),
        )?;
        tracing::info!(file_id = %file_id, object_key = %file.object_key, kind = %file_kind, "upload begun");
        Ok(file)
    }

    /// Stream `payload` into the file's object key as a multipart upload.
    ///
    /// The row stays PENDING; parts are invisible to the state machine.
    pub async fn upload_payload(
        &self,
        file: &FileObject,
        payload: PayloadStream,
    ) -> RegistryResult<StagedPayload> {
        let result = self.upload_inner(file, payload).await;
        if let Err(e) = &result {
            self.audit_failure(&file.created_by, AuditAction::UploadFailed, SubjectType::FileObject, file.file_id, e);
        }
        result
    }

    async fn upload_inner(
        &self,
        file: &FileObject,
        payload: PayloadStream,
    ) -> RegistryResult<StagedPayload> {
        if file.upload_state != UploadState::Pending {
            return Err(RegistryError::InvalidTransition(format!(
                "cannot stream payload for {} file {}",
                file.upload_state, file.file_id
            )));
        }

        let hasher = Arc::new(Mutex::new(Some(PayloadHasher::new(self.config.checksum_algorithm))));
        let tap = Arc::clone(&hasher);
        let hashed: PayloadStream = Box::pin(payload.map(move |chunk| tap_chunk(&tap, chunk)));

        let uploader = MultipartUploader::new(
            Arc::clone(&self.part_store),
            self.config.storage.part_size_bytes,
            self.config.storage.upload_concurrency,
        );
        let deadline = self.config.timeouts.payload();
        let uploaded = tokio::time::timeout(deadline, uploader.upload(&file.object_key, hashed))
            .await
            .map_err(|_| RegistryError::Timeout {
                operation: "upload_payload".into(),
                elapsed_ms: deadline.as_millis() as u64,
            })?;
        if hasher.is_poisoned() {
            return Err(RegistryError::Internal("payload hasher lock poisoned".into()));
        }
        let summary = uploaded?;

        let checksum = hasher
            .lock()
            .map_err(|_| RegistryError::Internal("payload hasher lock poisoned".into()))?
            .take()
            .map(PayloadHasher::finalize)
            .ok_or_else(|| RegistryError::Internal("payload hasher already consumed".into()))?;

        tracing::info!(
            file_id = %file.file_id,
            bytes = summary.bytes,
            parts = summary.parts,
            "payload staged"
        );
        Ok(StagedPayload { summary, checksum })
    }

    /// Re-hash the stored bytes and move the row PENDING -> STORED.
    ///
    /// A mismatch marks the row FAILED and schedules the bytes for purge.
    /// Redelivery for a row already STORED with the same checksum returns
    /// the row unchanged.
    pub async fn complete_upload(
        &self,
        object_key: &ObjectKey,
        actual_checksum: &Checksum,
    ) -> RegistryResult<FileObject> {
        let file = match self.file_by_key(object_key).await {
            Ok(file) => file,
            Err(e) => {
                self.audit_failure(&self.system_actor, AuditAction::UploadFailed, SubjectType::FileObject, object_key, &e);
                return Err(e);
            }
        };
        let result = self.complete_inner(&file, actual_checksum).await;
        if let Err(e) = &result {
            self.audit_failure(&file.created_by, AuditAction::UploadFailed, SubjectType::FileObject, file.file_id, e);
        }
        result
    }

    async fn complete_inner(&self, file: &FileObject, actual: &Checksum) -> RegistryResult<FileObject> {
        match file.upload_state {
            UploadState::Pending => {}
            UploadState::Stored | UploadState::Committed if file.checksum.as_ref() == Some(actual) => {
                tracing::debug!(file_id = %file.file_id, "complete_upload redelivered, row unchanged");
                return Ok(file.clone());
            }
            state => {
                return Err(RegistryError::InvalidTransition(format!(
                    "cannot complete upload of {state} file {}",
                    file.file_id
                )))
            }
        }

        let key = &file.object_key;
        let meta = self
            .store_call("store.head", || self.store.head(key))
            .await?
            .ok_or_else(|| RegistryError::ObjectMissing(key.to_string()))?;
        if meta.size > file.size_bytes {
            let err = RegistryError::SizeMismatch {
                object_key: key.to_string(),
                declared: file.size_bytes,
                actual: meta.size,
            };
            return self.fail_upload(file, err).await;
        }

        let bytes = self.store_call("store.get", || self.store.get(key)).await?;
        let mut hasher = PayloadHasher::new(self.config.checksum_algorithm);
        hasher.update(&bytes);
        let computed = hasher.finalize();
        if computed != *actual {
            let err = RegistryError::ChecksumMismatch {
                object_key: key.to_string(),
                expected: actual.to_string(),
                actual: computed.to_string(),
            };
            return self.fail_upload(file, err).await;
        }

        let patch = FilePatch::stored(computed.clone(), bytes.len() as u64);
        let stored = match self
            .catalog_call("catalog.transition", || {
                self.catalog.transition(
                    &file.file_id,
                    UploadState::Pending,
                    UploadState::Stored,
                    patch.clone(),
                )
            })
            .await
        {
            Ok(stored) => stored,
            Err(RegistryError::ConflictingState(reason)) => {
                // A concurrent delivery of the same completion may have won.
                let current = self.file_by_id(&file.file_id).await?;
                if matches!(current.upload_state, UploadState::Stored | UploadState::Committed)
                    && current.checksum.as_ref() == Some(&computed)
                {
                    return Ok(current);
                }
                return Err(RegistryError::ConflictingState(reason));
            }
            Err(e) => return Err(e),
        };

        self.audit(
            &file.created_by,
            AuditAction::UploadStored,
            SubjectType::FileObject,
            file.file_id,
            Some(format!("{} bytes, {computed}", stored.size_bytes)),
        )?;
        tracing::info!(file_id = %file.file_id, bytes = stored.size_bytes, "upload stored");
        Ok(stored)
    }

    async fn fail_upload(&self, file: &FileObject, err: RegistryError) -> RegistryResult<FileObject> {
        self.catalog_call("catalog.transition", || {
            self.catalog.transition(
                &file.file_id,
                file.upload_state,
                UploadState::Failed,
                FilePatch::none(),
            )
        })
        .await?;
        tracing::warn!(file_id = %file.file_id, error = %err, "upload failed, row marked FAILED");
        self.dispatch_purge(file).await;
        Err(err)
    }

    /// Give up on a PENDING or STORED upload: mark it FAILED and purge its
    /// bytes.
    pub async fn abandon_upload(&self, file_id: &FileId, reason: &str) -> RegistryResult<FileObject> {
        let file = self.file_by_id(file_id).await?;
        if !matches!(file.upload_state, UploadState::Pending | UploadState::Stored) {
            return Err(RegistryError::InvalidTransition(format!(
                "cannot abandon {} file {file_id}",
                file.upload_state
            )));
        }
        let failed = self
            .catalog_call("catalog.transition", || {
                self.catalog.transition(
                    file_id,
                    file.upload_state,
                    UploadState::Failed,
                    FilePatch::none(),
                )
            })
            .await?;
        self.audit(
            &file.created_by,
            AuditAction::UploadFailed,
            SubjectType::FileObject,
            file_id,
            Some(format!("abandoned: {reason}")),
        )?;
        tracing::warn!(file_id = %file_id, reason, "upload abandoned");
        self.dispatch_purge(&failed).await;
        Ok(failed)
    }

    // ------------------------------------------------------------------
    // Phase 2: commit
    // ------------------------------------------------------------------

    /// STORED -> COMMITTED in one catalog transaction, optionally adding the
    /// file to `reference`.
    ///
    /// A lost serialization race is retried up to `conflict_retries` times.
    /// A catalog failure leaves the row STORED; bytes are never rolled back.
    pub async fn commit(
        &self,
        object_key: &ObjectKey,
        reference: Option<RecordId>,
    ) -> RegistryResult<FileObject> {
        let file = match self.file_by_key(object_key).await {
            Ok(file) => file,
            Err(e) => {
                self.audit_failure(&self.system_actor, AuditAction::CommitFailed, SubjectType::FileObject, object_key, &e);
                return Err(e);
            }
        };
        let result = self.commit_inner(&file, reference).await;
        if let Err(e) = &result {
            self.audit_failure(&file.created_by, AuditAction::CommitFailed, SubjectType::FileObject, file.file_id, e);
        }
        result
    }

    async fn commit_inner(
        &self,
        file: &FileObject,
        reference: Option<RecordId>,
    ) -> RegistryResult<FileObject> {
        let mut conflicts = 0;
        loop {
            let attempt = self
                .catalog_call("catalog.commit_file", || {
                    self.catalog.commit_file(&file.file_id, reference)
                })
                .await;
            match attempt {
                Ok(outcome) => {
                    if outcome.transitioned {
                        let detail = match reference {
                            Some(record_id) => format!("referenced by record {record_id}"),
                            None => "unreferenced".to_string(),
                        };
                        self.audit(
                            &file.created_by,
                            AuditAction::FileCommitted,
                            SubjectType::FileObject,
                            file.file_id,
                            Some(detail),
                        )?;
                        tracing::info!(file_id = %file.file_id, object_key = %file.object_key, "file committed");
                    } else if let (true, Some(record_id)) = (outcome.reference_added, reference) {
                        // Already committed elsewhere; only the reference is new.
                        self.audit(
                            &file.created_by,
                            AuditAction::ReferenceAdded,
                            SubjectType::MetadataRecord,
                            record_id,
                            Some(format!("file {}", file.file_id)),
                        )?;
                    } else {
                        tracing::debug!(file_id = %file.file_id, "commit already applied");
                    }
                    return Ok(outcome.file);
                }
                Err(RegistryError::ConflictingState(reason)) if conflicts < self.config.conflict_retries => {
                    conflicts += 1;
                    let current = self.file_by_id(&file.file_id).await?;
                    if !matches!(current.upload_state, UploadState::Stored | UploadState::Committed) {
                        return Err(RegistryError::ConflictingState(reason));
                    }
                    tracing::warn!(file_id = %file.file_id, attempt = conflicts, %reason, "commit conflicted, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// COMMITTED -> TOMBSTONED, dropping every record reference and index
    /// link in the same transaction. Bytes are retained.
    pub async fn tombstone(
        &self,
        ctx: &ActorContext,
        file_id: &FileId,
        reason: &str,
    ) -> RegistryResult<FileObject> {
        let file = match self.file_by_id(file_id).await {
            Ok(file) => file,
            Err(e) => {
                self.audit_failure(&ctx.actor_id, AuditAction::TombstoneFailed, SubjectType::FileObject, file_id, &e);
                return Err(e);
            }
        };
        self.authorize(ctx, &file.project_id, Operation::TombstoneFile, &file_id.to_string())?;

        let result = if file.is_committed() {
            self.catalog_call("catalog.tombstone_file", || {
                self.catalog.tombstone_file(file_id, reason)
            })
            .await
        } else {
            Err(RegistryError::InvalidTransition(format!(
                "only COMMITTED files can be tombstoned, {file_id} is {}",
                file.upload_state
            )))
        };

        match result {
            Ok(tombstoned) => {
                self.audit(
                    &ctx.actor_id,
                    AuditAction::FileTombstoned,
                    SubjectType::FileObject,
                    file_id,
                    Some(reason.to_string()),
                )?;
                tracing::info!(file_id = %file_id, reason, "file tombstoned");
                Ok(tombstoned)
            }
            Err(e) => {
                self.audit_failure(&ctx.actor_id, AuditAction::TombstoneFailed, SubjectType::FileObject, file_id, &e);
                Err(e)
            }
        }
    }

    /// Delete the bytes of a FAILED file. Never touches COMMITTED or
    /// TOMBSTONED payloads.
    pub async fn purge_object(&self, file_id: &FileId, object_key: &ObjectKey) -> RegistryResult<()> {
        let file = self.file_by_id(file_id).await?;
        if file.upload_state != UploadState::Failed {
            return Err(RegistryError::InvalidTransition(format!(
                "refusing to purge bytes of {} file {file_id}",
                file.upload_state
            )));
        }
        if file.object_key != *object_key {
            return Err(RegistryError::InvalidRequest(format!(
                "{object_key} does not belong to file {file_id}"
            )));
        }
        self.store_call("store.delete", || self.store.delete(object_key))
            .await?;
        self.audit(
            &self.system_actor,
            AuditAction::ObjectPurged,
            SubjectType::FileObject,
            file_id,
            Some(object_key.to_string()),
        )?;
        tracing::info!(file_id = %file_id, object_key = %object_key, "object purged");
        Ok(())
    }

    /// Hand `job` to the task queue. `false` when there is no queue or it
    /// refused the job.
    pub async fn defer(&self, job: RegistrationJob) -> bool {
        let Some(queue) = &self.jobs else {
            return false;
        };
        let name = job.name();
        match queue.enqueue(JobEnvelope::new(job)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(job = name, error = %e, "enqueue failed");
                false
            }
        }
    }

    async fn dispatch_purge(&self, file: &FileObject) {
        let job = RegistrationJob::PurgeObject {
            file_id: file.file_id,
            object_key: file.object_key.clone(),
        };
        if self.defer(job).await {
            return;
        }
        if let Err(e) = self.purge_object(&file.file_id, &file.object_key).await {
            tracing::error!(file_id = %file.file_id, error = %e, "inline purge failed");
        }
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    /// Evaluate the gate and mirror the decision into the ledger.
    pub fn authorize(
        &self,
        ctx: &ActorContext,
        project_id: &ProjectId,
        operation: Operation,
        subject_id: &str,
    ) -> RegistryResult<AccessGrant> {
        self.authorize_request(&AccessRequest::new(ctx, project_id, operation, subject_id))
    }

    pub(crate) fn authorize_request(&self, request: &AccessRequest<'_>) -> RegistryResult<AccessGrant> {
        let grant = self.gate.evaluate(request)?;
        let (action, detail) = match &grant.reason {
            None => (
                AuditAction::AccessGranted,
                format!("{} in {}", grant.operation, grant.project_id),
            ),
            Some(reason) => (
                AuditAction::AccessDenied,
                format!("{} in {}: {reason}", grant.operation, grant.project_id),
            ),
        };
        self.audit(
            &request.actor.actor_id,
            action,
            subject_type_of(request.resource_type),
            request.subject_id,
            Some(detail),
        )?;
        if grant.is_allowed() {
            Ok(grant)
        } else {
            Err(RegistryError::PolicyDenied {
                reason: grant.reason.unwrap_or_default(),
            })
        }
    }

    pub(crate) fn audit(
        &self,
        actor: &ActorId,
        action: AuditAction,
        subject_type: SubjectType,
        subject_id: impl ToString,
        detail: Option<String>,
    ) -> RegistryResult<AuditEntry> {
        let mut event = AuditEvent::new(actor.clone(), action, subject_type, subject_id);
        if let Some(detail) = detail {
            event = event.with_detail(detail);
        }
        Ok(self.ledger.append(event)?)
    }

    /// Record a failed attempt. Denials are already mirrored by
    /// [`authorize`](Self::authorize) and are skipped here.
    pub(crate) fn audit_failure(
        &self,
        actor: &ActorId,
        action: AuditAction,
        subject_type: SubjectType,
        subject_id: impl ToString,
        err: &RegistryError,
    ) {
        let action = match err {
            RegistryError::PolicyDenied { .. } => return,
            RegistryError::QuotaExceeded { .. } => AuditAction::QuotaExceeded,
            _ => action,
        };
        if let Err(ledger_err) = self.audit(actor, action, subject_type, subject_id, Some(err.to_string())) {
            tracing::error!(error = %ledger_err, original = %err, "failed to record failure in audit ledger");
        }
    }

    pub(crate) async fn catalog_call<T, F, Fut>(&self, operation: &'static str, call: F) -> RegistryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        retry_transient(&self.config.retry, self.config.timeouts.catalog(), operation, call)
            .await
            .map_err(RegistryError::from)
    }

    pub(crate) async fn store_call<T, F, Fut>(&self, operation: &'static str, call: F) -> RegistryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        retry_transient(&self.config.retry, self.config.timeouts.storage(), operation, call)
            .await
            .map_err(RegistryError::from)
    }

    pub async fn file_by_id(&self, file_id: &FileId) -> RegistryResult<FileObject> {
        self.catalog_call("catalog.get_file", || self.catalog.get_file(file_id))
            .await?
            .ok_or_else(|| RegistryError::not_found("file", file_id))
    }

    pub async fn file_by_key(&self, object_key: &ObjectKey) -> RegistryResult<FileObject> {
        self.catalog_call("catalog.get_file_by_key", || {
            self.catalog.get_file_by_key(object_key)
        })
        .await?
        .ok_or_else(|| RegistryError::not_found("file", object_key))
    }
}

/// Feed one payload chunk to the running hasher. A poisoned hasher fails
/// the chunk, so the upload stops instead of staging a partial checksum.
fn tap_chunk(hasher: &Mutex<Option<PayloadHasher>>, chunk: io::Result<Bytes>) -> io::Result<Bytes> {
    let bytes = chunk?;
    let mut guard = hasher
        .lock()
        .map_err(|_| io::Error::other("payload hasher lock poisoned"))?;
    if let Some(h) = guard.as_mut() {
        h.update(&bytes);
    }
    Ok(bytes)
}
