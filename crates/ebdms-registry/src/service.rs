//! The `Ebdms` facade: the operations an outer API layer calls.

use std::sync::Arc;

use bytes::Bytes;
use ebdms_catalog::{FileQuery, InMemoryCatalog};
use ebdms_gate::{AccessGrant, AccessRequest, Operation, ResourceType};
use ebdms_ledger::{
    AuditAction, AuditEntry, AuditFilter, AuditReader, AuditValidator, InMemoryAuditLedger,
    SubjectType, ValidationReport,
};
use ebdms_store::{payload_from_bytes, InMemoryObjectStore, PayloadStream};
use ebdms_types::{
    ActorContext, Checksum, FileId, FileKind, FileObject, IndexFormat, IndexLink, IndexSpec,
    MetadataRecord, Project, ProjectId, RecordId,
};

use crate::config::EngineConfig;
use crate::engine::{RegistrationEngine, UploadOptions};
use crate::error::{RegistryError, RegistryResult};
use crate::jobs::RegistrationJob;
use crate::linkage::IndexLinkManager;

/// Scope used for gate decisions that are not tied to one project.
const GLOBAL_SCOPE: &str = "*";

/// A payload plus the size the client declared for it.
pub struct FilePayload {
    pub stream: PayloadStream,
    pub declared_size: u64,
}

impl FilePayload {
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            declared_size: data.len() as u64,
            stream: payload_from_bytes(data, 64 * 1024),
        }
    }

    pub fn from_stream(stream: PayloadStream, declared_size: u64) -> Self {
        Self {
            stream,
            declared_size,
        }
    }
}

/// Options for [`Ebdms::register_file`].
#[derive(Clone, Debug, Default)]
pub struct RegisterOptions {
    pub upload: UploadOptions,
    /// Checksum the client computed. When absent the checksum taken while
    /// streaming is used; either way the stored bytes are re-hashed.
    pub expected_checksum: Option<Checksum>,
    /// Record that should reference the file once it is committed.
    pub reference: Option<RecordId>,
}

impl RegisterOptions {
    pub fn expect_checksum(mut self, checksum: Checksum) -> Self {
        self.expected_checksum = Some(checksum);
        self
    }

    pub fn reference(mut self, record_id: RecordId) -> Self {
        self.reference = Some(record_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.upload = self.upload.with_metadata(key, value);
        self
    }
}

pub struct Ebdms {
    engine: Arc<RegistrationEngine>,
    links: IndexLinkManager,
}

impl Ebdms {
    pub fn new(engine: Arc<RegistrationEngine>) -> Self {
        Self {
            links: IndexLinkManager::new(Arc::clone(&engine)),
            engine,
        }
    }

    /// Everything in memory; for demos and tests.
    pub fn in_memory(config: EngineConfig) -> RegistryResult<Self> {
        let engine = RegistrationEngine::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryCatalog::new()),
            Arc::new(InMemoryAuditLedger::new()),
            config,
        )?;
        Ok(Self::new(Arc::new(engine)))
    }

    pub fn engine(&self) -> &Arc<RegistrationEngine> {
        &self.engine
    }

    pub fn links(&self) -> &IndexLinkManager {
        &self.links
    }

    // ----- projects -----

    /// Register a project. Gated in the global scope; the standard policy
    /// table leaves this to superusers.
    pub async fn register_project(&self, ctx: &ActorContext, project: Project) -> RegistryResult<Project> {
        let scope = ProjectId::new(GLOBAL_SCOPE)?;
        let subject = project.project_id.to_string();
        self.engine
            .authorize(ctx, &scope, Operation::RegisterProject, &subject)?;

        self.engine
            .catalog_call("catalog.register_project", || {
                self.engine.catalog().register_project(project.clone())
            })
            .await?;
        self.engine.audit(
            &ctx.actor_id,
            AuditAction::ProjectRegistered,
            SubjectType::Project,
            &subject,
            Some(format!("{} ({})", project.name, project.code)),
        )?;
        tracing::info!(project_id = %project.project_id, "project registered");
        Ok(project)
    }

    // ----- files -----

    /// Begin, stream, verify, and commit one file.
    ///
    /// A failure after the bytes are stored leaves the row STORED; when a
    /// task queue is attached the commit is handed to it for redelivery.
    pub async fn register_file(
        &self,
        ctx: &ActorContext,
        project_id: &ProjectId,
        file_kind: FileKind,
        payload: FilePayload,
        options: RegisterOptions,
    ) -> RegistryResult<FileObject> {
        if let Some(expected) = &options.expected_checksum {
            let configured = self.engine.config().checksum_algorithm;
            if expected.algorithm != configured {
                return Err(RegistryError::InvalidRequest(format!(
                    "checksums must use {configured}, got {}",
                    expected.algorithm
                )));
            }
        }
        if let Some(record_id) = options.reference {
            self.check_reference_target(ctx, project_id, &record_id).await?;
        }

        let file = self
            .engine
            .begin_upload(ctx, project_id, file_kind, payload.declared_size, options.upload)
            .await?;

        let staged = match self.engine.upload_payload(&file, payload.stream).await {
            Ok(staged) => staged,
            Err(e) => {
                if let Err(abandon) = self.engine.abandon_upload(&file.file_id, &e.to_string()).await {
                    tracing::error!(file_id = %file.file_id, error = %abandon, "could not abandon failed upload");
                }
                return Err(e);
            }
        };

        let expected = options.expected_checksum.unwrap_or(staged.checksum);
        self.engine.complete_upload(&file.object_key, &expected).await?;

        match self.engine.commit(&file.object_key, options.reference).await {
            Ok(committed) => Ok(committed),
            Err(e) if e.is_retryable() => {
                let deferred = self
                    .engine
                    .defer(RegistrationJob::Commit {
                        object_key: file.object_key.clone(),
                        reference: options.reference,
                    })
                    .await;
                tracing::warn!(file_id = %file.file_id, error = %e, deferred, "commit failed, row left STORED");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Commit a STORED file whose registration stopped short of commit,
    /// e.g. after a catalog outage.
    pub async fn commit_pending(
        &self,
        ctx: &ActorContext,
        file_id: &FileId,
        reference: Option<RecordId>,
    ) -> RegistryResult<FileObject> {
        let file = self.engine.file_by_id(file_id).await?;
        self.engine
            .authorize(ctx, &file.project_id, Operation::CommitFile, &file_id.to_string())?;
        if let Some(record_id) = reference {
            self.check_reference_target(ctx, &file.project_id, &record_id).await?;
        }
        self.engine.commit(&file.object_key, reference).await
    }

    /// Register `payload` as an index of `primary_id` and link it.
    pub async fn attach_index(
        &self,
        ctx: &ActorContext,
        primary_id: &FileId,
        payload: FilePayload,
        format: IndexFormat,
    ) -> RegistryResult<IndexLink> {
        let primary = match self.engine.file_by_id(primary_id).await {
            Ok(file) => file,
            Err(e) => {
                self.links.reject(ctx, primary_id, &e);
                return Err(e);
            }
        };
        self.engine.authorize(
            ctx,
            &primary.project_id,
            Operation::AttachIndex,
            &primary_id.to_string(),
        )?;

        let precheck = if primary.is_committed() {
            IndexSpec::new(format, primary.file_kind)
                .map_err(|e| RegistryError::IncompatibleIndex(e.to_string()))
        } else {
            Err(RegistryError::PrimaryNotCommitted(primary_id.to_string()))
        };
        let spec = match precheck {
            Ok(spec) => spec,
            Err(e) => {
                self.links.reject(ctx, primary_id, &e);
                return Err(e);
            }
        };

        let index = self
            .register_file(
                ctx,
                &primary.project_id,
                FileKind::Index,
                payload,
                RegisterOptions {
                    upload: UploadOptions::index(spec),
                    ..RegisterOptions::default()
                },
            )
            .await?;
        self.links.attach_authorized(ctx, &primary, &index.file_id).await
    }

    /// Stream a COMMITTED file's bytes back to an authorized reader.
    pub async fn fetch_file(&self, ctx: &ActorContext, file_id: &FileId) -> RegistryResult<PayloadStream> {
        let file = match self.engine.file_by_id(file_id).await {
            Ok(file) => file,
            Err(e) => {
                self.fetch_failed(ctx, file_id, &e);
                return Err(e);
            }
        };
        self.engine
            .authorize(ctx, &file.project_id, Operation::ReadFile, &file_id.to_string())?;

        if !file.upload_state.is_visible() {
            let e = RegistryError::not_found("file", file_id);
            self.fetch_failed(ctx, file_id, &e);
            return Err(e);
        }
        let bytes = match self
            .engine
            .store_call("store.get", || self.engine.store().get(&file.object_key))
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fetch_failed(ctx, file_id, &e);
                return Err(e);
            }
        };
        self.engine.audit(
            &ctx.actor_id,
            AuditAction::FileFetched,
            SubjectType::FileObject,
            file_id,
            Some(format!("{} bytes", bytes.len())),
        )?;
        Ok(payload_from_bytes(bytes, self.engine.config().storage.part_size_bytes))
    }

    fn fetch_failed(&self, ctx: &ActorContext, file_id: &FileId, err: &RegistryError) {
        self.engine.audit_failure(
            &ctx.actor_id,
            AuditAction::FetchFailed,
            SubjectType::FileObject,
            file_id,
            err,
        );
    }

    pub async fn tombstone_file(
        &self,
        ctx: &ActorContext,
        file_id: &FileId,
        reason: &str,
    ) -> RegistryResult<FileObject> {
        self.engine.tombstone(ctx, file_id, reason).await
    }

    /// COMMITTED files in `project_id`, optionally of one kind.
    pub async fn list_files(
        &self,
        ctx: &ActorContext,
        project_id: &ProjectId,
        file_kind: Option<FileKind>,
    ) -> RegistryResult<Vec<FileObject>> {
        self.engine
            .authorize(ctx, project_id, Operation::ReadFile, project_id.as_str())?;
        let query = FileQuery {
            project_id: Some(project_id.clone()),
            file_kind,
        };
        self.engine
            .catalog_call("catalog.query_files", || self.engine.catalog().query_files(&query))
            .await
    }

    pub async fn active_indexes(&self, ctx: &ActorContext, primary_id: &FileId) -> RegistryResult<Vec<IndexLink>> {
        let primary = self.engine.file_by_id(primary_id).await?;
        self.engine
            .authorize(ctx, &primary.project_id, Operation::ReadFile, &primary_id.to_string())?;
        self.links.active_indexes(primary_id).await
    }

    // ----- records -----

    pub async fn create_record(&self, ctx: &ActorContext, record: MetadataRecord) -> RegistryResult<MetadataRecord> {
        let subject = record.record_id;
        self.engine.authorize_request(
            &AccessRequest::new(ctx, &record.project_id, Operation::UpdateRecord, &subject.to_string()),
        )?;
        let result = self
            .engine
            .catalog_call("catalog.insert_record", || {
                self.engine.catalog().insert_record(record.clone())
            })
            .await;
        match result {
            Ok(()) => {
                self.engine.audit(
                    &ctx.actor_id,
                    AuditAction::RecordCreated,
                    SubjectType::MetadataRecord,
                    subject,
                    Some(format!("{} {}", record.kind, record.label)),
                )?;
                Ok(record)
            }
            Err(e) => {
                self.engine.audit_failure(
                    &ctx.actor_id,
                    AuditAction::RecordRejected,
                    SubjectType::MetadataRecord,
                    subject,
                    &e,
                );
                Err(e)
            }
        }
    }

    /// Add a COMMITTED file to a record's references.
    pub async fn reference_file(
        &self,
        ctx: &ActorContext,
        record_id: &RecordId,
        file_id: &FileId,
    ) -> RegistryResult<MetadataRecord> {
        let record = self.get_record(record_id).await?;
        self.engine.authorize_request(
            &AccessRequest::new(ctx, &record.project_id, Operation::UpdateRecord, &record_id.to_string()),
        )?;
        let result = self
            .engine
            .catalog_call("catalog.add_reference", || {
                self.engine.catalog().add_reference(record_id, file_id)
            })
            .await;
        match result {
            Ok(updated) => {
                self.engine.audit(
                    &ctx.actor_id,
                    AuditAction::ReferenceAdded,
                    SubjectType::MetadataRecord,
                    record_id,
                    Some(format!("file {file_id}")),
                )?;
                Ok(updated)
            }
            Err(e) => {
                self.engine.audit_failure(
                    &ctx.actor_id,
                    AuditAction::ReferenceRejected,
                    SubjectType::MetadataRecord,
                    record_id,
                    &e,
                );
                Err(e)
            }
        }
    }

    pub async fn record(&self, ctx: &ActorContext, record_id: &RecordId) -> RegistryResult<MetadataRecord> {
        let record = self.get_record(record_id).await?;
        self.engine
            .authorize(ctx, &record.project_id, Operation::ReadRecord, &record_id.to_string())?;
        Ok(record)
    }

    async fn get_record(&self, record_id: &RecordId) -> RegistryResult<MetadataRecord> {
        self.engine
            .catalog_call("catalog.get_record", || self.engine.catalog().get_record(record_id))
            .await?
            .ok_or_else(|| RegistryError::not_found("record", record_id))
    }

    async fn check_reference_target(
        &self,
        ctx: &ActorContext,
        project_id: &ProjectId,
        record_id: &RecordId,
    ) -> RegistryResult<()> {
        let record = self.get_record(record_id).await?;
        if record.project_id != *project_id {
            return Err(RegistryError::InvalidRequest(format!(
                "record {record_id} belongs to project {}, not {project_id}",
                record.project_id
            )));
        }
        self.engine
            .authorize(ctx, project_id, Operation::UpdateRecord, &record_id.to_string())
            .map(|_| ())
    }

    // ----- audit -----

    /// Read the audit history. Needs `ReadAudit` on at least one project
    /// the actor belongs to, or superuser status.
    pub async fn query_audit(&self, ctx: &ActorContext, filter: &AuditFilter) -> RegistryResult<Vec<AuditEntry>> {
        self.authorize_audit_read(ctx)?;
        Ok(self.engine.ledger().query(filter)?)
    }

    fn authorize_audit_read(&self, ctx: &ActorContext) -> RegistryResult<AccessGrant> {
        let policy = &self.engine.gate().config().policy;
        let scope = if ctx.superuser {
            ProjectId::new(GLOBAL_SCOPE)?
        } else {
            let permitted = ctx
                .project_roles
                .iter()
                .find(|(_, role)| policy.permits(**role, Operation::ReadAudit, ResourceType::AuditLog))
                .or_else(|| ctx.project_roles.iter().next())
                .map(|(project, _)| project.clone());
            match permitted {
                Some(project) => project,
                None => ProjectId::new(GLOBAL_SCOPE)?,
            }
        };
        self.engine
            .authorize(ctx, &scope, Operation::ReadAudit, "audit_log")
    }

    /// Recompute every hash link from genesis.
    pub fn verify_audit_chain(&self) -> RegistryResult<()> {
        let ledger = self.engine.ledger();
        ledger.verify_all()?;
        tracing::info!(entries = ledger.entry_count()?, "audit chain verified");
        Ok(())
    }

    /// Full integrity report, listing every violation found.
    pub fn validate_audit(&self) -> RegistryResult<ValidationReport> {
        let report = AuditValidator::validate(self.engine.ledger().as_ref())?;
        if let Some(first) = report.first_violation() {
            tracing::error!(
                violations = report.violations.len(),
                first_seq = first.seq,
                first = %first.description,
                "audit ledger failed validation"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use ebdms_store::collect_payload;
    use ebdms_types::{ActorId, RecordKind, Role, UploadState};

    use super::*;
    use crate::config::RetryConfig;

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.retry = RetryConfig::immediate(2);
        config
    }

    fn admin() -> ActorContext {
        ActorContext::new(ActorId::new("root").unwrap(), true).as_superuser()
    }

    fn member(name: &str, project: &ProjectId, role: Role, mfa: bool) -> ActorContext {
        ActorContext::new(ActorId::new(name).unwrap(), mfa).with_role(project.clone(), role)
    }

    async fn service_with_project() -> (Ebdms, ProjectId) {
        let ebdms = Ebdms::in_memory(config()).unwrap();
        let project = ProjectId::new("p1").unwrap();
        ebdms
            .register_project(&admin(), Project::new(project.clone(), "P1", "Pilot"))
            .await
            .unwrap();
        (ebdms, project)
    }

    #[tokio::test]
    async fn only_superusers_register_projects() {
        let ebdms = Ebdms::in_memory(config()).unwrap();
        let project = ProjectId::new("p1").unwrap();
        let user = member("bob", &project, Role::Admin, true);
        let err = ebdms
            .register_project(&user, Project::new(project.clone(), "P1", "Pilot"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::PolicyDenied { .. }));

        let no_mfa = ActorContext::new(ActorId::new("root").unwrap(), false).as_superuser();
        assert!(ebdms
            .register_project(&no_mfa, Project::new(project.clone(), "P1", "Pilot"))
            .await
            .is_err());

        ebdms
            .register_project(&admin(), Project::new(project, "P1", "Pilot"))
            .await
            .unwrap();
        let actions: Vec<_> = ebdms
            .engine()
            .ledger()
            .read_all()
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::AccessDenied,
                AuditAction::AccessDenied,
                AuditAction::AccessGranted,
                AuditAction::ProjectRegistered,
            ]
        );
    }

    #[tokio::test]
    async fn policy_table_can_delegate_project_registration() {
        let mut config = config();
        config.gate.policy.grant(
            Role::Admin,
            Operation::RegisterProject,
            ResourceType::Project,
            ebdms_gate::Privilege::Admin,
        );
        let ebdms = Ebdms::in_memory(config).unwrap();
        let global = ProjectId::new(GLOBAL_SCOPE).unwrap();
        let project = ProjectId::new("p2").unwrap();

        let steward = member("carol", &global, Role::Admin, true);
        ebdms
            .register_project(&steward, Project::new(project.clone(), "P2", "Second"))
            .await
            .unwrap();

        // A curator on the global scope still lacks the privilege.
        let curator = member("dave", &global, Role::Curator, true);
        let err = ebdms
            .register_project(&curator, Project::new(ProjectId::new("p3").unwrap(), "P3", "Third"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::PolicyDenied { .. }));
    }

    #[tokio::test]
    async fn register_then_fetch_returns_the_bytes() {
        let (ebdms, project) = service_with_project().await;
        let alice = member("alice", &project, Role::Contributor, true);
        let file = ebdms
            .register_file(&alice, &project, FileKind::Vcf, FilePayload::from_bytes(&b"##fileformat=VCFv4.2\n"[..]), RegisterOptions::default())
            .await
            .unwrap();
        assert_eq!(file.upload_state, UploadState::Committed);

        let bytes = collect_payload(ebdms.fetch_file(&alice, &file.file_id).await.unwrap())
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"##fileformat=VCFv4.2\n");
        assert_eq!(
            ebdms.engine().ledger().head().unwrap().unwrap().action,
            AuditAction::FileFetched
        );
    }

    #[tokio::test]
    async fn fetch_without_mfa_is_denied() {
        let (ebdms, project) = service_with_project().await;
        let alice = member("alice", &project, Role::Contributor, true);
        let file = ebdms
            .register_file(&alice, &project, FileKind::Bed, FilePayload::from_bytes(&b"chr1\t1\t2\n"[..]), RegisterOptions::default())
            .await
            .unwrap();

        let viewer = member("vic", &project, Role::Viewer, false);
        let err = ebdms.fetch_file(&viewer, &file.file_id).await.err().unwrap();
        assert!(matches!(err, RegistryError::PolicyDenied { .. }));
        let head = ebdms.engine().ledger().head().unwrap().unwrap();
        assert_eq!(head.action, AuditAction::AccessDenied);
        assert_eq!(head.actor_id.as_str(), "vic");
    }

    #[tokio::test]
    async fn mismatched_client_checksum_fails_the_file() {
        let (ebdms, project) = service_with_project().await;
        let alice = member("alice", &project, Role::Contributor, true);
        let wrong = ebdms_crypto::PayloadHasher::checksum(ebdms_types::ChecksumAlgorithm::Sha256, b"other");
        let err = ebdms
            .register_file(
                &alice,
                &project,
                FileKind::Vcf,
                FilePayload::from_bytes(&b"data"[..]),
                RegisterOptions::default().expect_checksum(wrong),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::ChecksumMismatch { .. }));
        assert!(ebdms.list_files(&alice, &project, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn checksum_in_another_algorithm_is_rejected_up_front() {
        let (ebdms, project) = service_with_project().await;
        let alice = member("alice", &project, Role::Contributor, true);
        let blake = ebdms_crypto::PayloadHasher::checksum(ebdms_types::ChecksumAlgorithm::Blake3, b"data");
        let err = ebdms
            .register_file(
                &alice,
                &project,
                FileKind::Vcf,
                FilePayload::from_bytes(&b"data"[..]),
                RegisterOptions::default().expect_checksum(blake),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn register_with_reference_links_the_record() {
        let (ebdms, project) = service_with_project().await;
        let alice = member("alice", &project, Role::Contributor, true);
        let sample = ebdms
            .create_record(&alice, MetadataRecord::new(project.clone(), RecordKind::Sample, "S-001"))
            .await
            .unwrap();
        let file = ebdms
            .register_file(
                &alice,
                &project,
                FileKind::Vcf,
                FilePayload::from_bytes(&b"##vcf"[..]),
                RegisterOptions::default().reference(sample.record_id),
            )
            .await
            .unwrap();
        let record = ebdms.record(&alice, &sample.record_id).await.unwrap();
        assert!(record.references(&file.file_id));
    }

    #[tokio::test]
    async fn reference_to_uncommitted_file_is_rejected() {
        let (ebdms, project) = service_with_project().await;
        let alice = member("alice", &project, Role::Contributor, true);
        let record = ebdms
            .create_record(&alice, MetadataRecord::new(project.clone(), RecordKind::Participant, "P-1"))
            .await
            .unwrap();
        let pending = ebdms
            .engine()
            .begin_upload(&alice, &project, FileKind::Vcf, 3, UploadOptions::default())
            .await
            .unwrap();
        let err = ebdms
            .reference_file(&alice, &record.record_id, &pending.file_id)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::ConflictingState(_)));
        assert_eq!(
            ebdms.engine().ledger().head().unwrap().unwrap().action,
            AuditAction::ReferenceRejected
        );
    }

    #[tokio::test]
    async fn audit_history_is_for_auditors() {
        let (ebdms, project) = service_with_project().await;
        let contributor = member("alice", &project, Role::Contributor, true);
        let auditor = member("audra", &project, Role::Auditor, true);

        let err = ebdms
            .query_audit(&contributor, &AuditFilter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::PolicyDenied { .. }));

        let entries = ebdms
            .query_audit(&auditor, &AuditFilter::new().action(AuditAction::AccessDenied))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].actor_id.as_str(), "alice");

        assert!(ebdms.query_audit(&admin(), &AuditFilter::new()).await.is_ok());
    }

    #[tokio::test]
    async fn attach_index_registers_and_links() {
        let (ebdms, project) = service_with_project().await;
        let alice = member("alice", &project, Role::Contributor, true);
        let vcf = ebdms
            .register_file(&alice, &project, FileKind::Vcf, FilePayload::from_bytes(&b"##vcf"[..]), RegisterOptions::default())
            .await
            .unwrap();
        let link = ebdms
            .attach_index(&alice, &vcf.file_id, FilePayload::from_bytes(&b"TBI\x01"[..]), IndexFormat::Tbi)
            .await
            .unwrap();
        assert_eq!(link.primary_id, vcf.file_id);
        let index = ebdms.engine().file_by_id(&link.index_id).await.unwrap();
        assert_eq!(index.file_kind, FileKind::Index);
        assert_eq!(index.upload_state, UploadState::Committed);
        assert_eq!(ebdms.active_indexes(&alice, &vcf.file_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn chain_verifies_after_a_session() {
        let (ebdms, project) = service_with_project().await;
        let alice = member("alice", &project, Role::Contributor, true);
        ebdms
            .register_file(&alice, &project, FileKind::Parquet, FilePayload::from_bytes(vec![1u8; 2048]), RegisterOptions::default())
            .await
            .unwrap();
        ebdms.verify_audit_chain().unwrap();
        let report = ebdms.validate_audit().unwrap();
        assert!(report.is_valid());
        assert!(report.entry_count > 5);
    }
}
