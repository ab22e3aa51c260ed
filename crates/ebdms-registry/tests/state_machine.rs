//! Random operation sequences never leave the registration state machine.

use std::sync::Arc;

use bytes::Bytes;
use ebdms_catalog::{CatalogStore, InMemoryCatalog};
use ebdms_crypto::PayloadHasher;
use ebdms_ledger::{AuditReader, InMemoryAuditLedger};
use ebdms_registry::{
    ActorContext, ActorId, ChecksumAlgorithm, EngineConfig, FileKind, MetadataRecord, Project,
    ProjectId, RecordKind, RegistrationEngine, RetryConfig, Role, UploadOptions, UploadState,
};
use ebdms_store::{payload_from_bytes, InMemoryObjectStore};
use proptest::prelude::*;

const PAYLOAD: &[u8] = b"##fileformat=VCFv4.2\nchr1\t100\t.\tA\tT\n";

#[derive(Clone, Debug)]
enum Step {
    Upload,
    Complete { good: bool },
    Commit { reference: bool },
    Tombstone,
    Abandon,
    CatalogFault,
    Conflict,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Upload),
        any::<bool>().prop_map(|good| Step::Complete { good }),
        any::<bool>().prop_map(|reference| Step::Commit { reference }),
        Just(Step::Tombstone),
        Just(Step::Abandon),
        Just(Step::CatalogFault),
        Just(Step::Conflict),
    ]
}

async fn run(steps: Vec<Step>) -> Result<(), TestCaseError> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let ledger = Arc::new(InMemoryAuditLedger::new());
    let project = ProjectId::new("p1").unwrap();
    catalog
        .register_project(Project::new(project.clone(), "P1", "Pilot"))
        .await
        .unwrap();
    let mut config = EngineConfig::default();
    config.retry = RetryConfig::immediate(2);
    config.conflict_retries = 1;
    let engine = RegistrationEngine::new(
        Arc::new(InMemoryObjectStore::new()),
        catalog.clone(),
        ledger.clone(),
        config,
    )
    .unwrap();

    let ctx = ActorContext::new(ActorId::new("alice").unwrap(), true)
        .with_role(project.clone(), Role::Curator);
    let record = MetadataRecord::new(project.clone(), RecordKind::Sample, "S-1");
    catalog.insert_record(record.clone()).await.unwrap();

    let file = engine
        .begin_upload(&ctx, &project, FileKind::Vcf, PAYLOAD.len() as u64, UploadOptions::default())
        .await
        .unwrap();
    let good = PayloadHasher::checksum(ChecksumAlgorithm::Sha256, PAYLOAD);
    let bad = PayloadHasher::checksum(ChecksumAlgorithm::Sha256, b"something else");

    let mut previous = UploadState::Pending;
    let mut fault = false;
    for step in steps {
        if std::mem::take(&mut fault) {
            // Enough to exhaust the retry budget of the next call.
            catalog.fail_next(2);
        }
        // Outcomes are irrelevant; only the observable state matters.
        let _ = match step {
            Step::Upload => engine
                .upload_payload(&file, payload_from_bytes(Bytes::from_static(PAYLOAD), 8))
                .await
                .map(|_| ()),
            Step::Complete { good: ok } => engine
                .complete_upload(&file.object_key, if ok { &good } else { &bad })
                .await
                .map(|_| ()),
            Step::Commit { reference } => engine
                .commit(&file.object_key, reference.then_some(record.record_id))
                .await
                .map(|_| ()),
            Step::Tombstone => engine.tombstone(&ctx, &file.file_id, "test").await.map(|_| ()),
            Step::Abandon => engine.abandon_upload(&file.file_id, "test").await.map(|_| ()),
            Step::CatalogFault => {
                fault = true;
                Ok(())
            }
            Step::Conflict => {
                catalog.conflict_next(1);
                Ok(())
            }
        };
        catalog.fail_next(0);

        let current = catalog.get_file(&file.file_id).await.unwrap().unwrap().upload_state;
        prop_assert!(
            current == previous || previous.can_transition_to(current),
            "illegal transition {previous} -> {current}"
        );

        let referencing = catalog.records_referencing(&file.file_id).await.unwrap();
        if !referencing.is_empty() {
            prop_assert_eq!(current, UploadState::Committed);
        }
        previous = current;
    }

    let count = ledger.entry_count().unwrap();
    prop_assert!(ledger.verify_chain(0, count - 1));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn only_legal_transitions_are_observed(steps in prop::collection::vec(step(), 1..20)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(run(steps))?;
    }
}
