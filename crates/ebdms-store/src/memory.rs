use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use ebdms_types::ObjectKey;

use crate::error::{StoreError, StoreResult};
use crate::traits::{CompletedPart, ObjectMeta, ObjectStore, UploadId};

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
}

struct PendingUpload {
    key: ObjectKey,
    parts: BTreeMap<u32, (String, Bytes)>,
}

#[derive(Default)]
struct StoreState {
    objects: HashMap<ObjectKey, StoredObject>,
    uploads: HashMap<UploadId, PendingUpload>,
    generation: u64,
}

impl StoreState {
    fn next_etag(&mut self) -> String {
        self.generation += 1;
        format!("{:016x}", self.generation)
    }

    fn store(&mut self, key: &ObjectKey, data: Bytes) -> ObjectMeta {
        let etag = self.next_etag();
        let now = Utc::now();
        let size = data.len() as u64;
        self.objects.insert(
            key.clone(),
            StoredObject {
                data,
                etag: etag.clone(),
                last_modified: now,
            },
        );
        ObjectMeta {
            key: key.clone(),
            size,
            etag,
            last_modified: now,
        }
    }
}

/// In-memory object store.
///
/// Intended for tests and embedding. Supports fault injection
/// ([`fail_next`](Self::fail_next)) and artificial latency
/// ([`set_latency`](Self::set_latency)) so retry and timeout paths can be
/// exercised deterministically. The lock is never held across an await.
#[derive(Default)]
pub struct InMemoryObjectStore {
    state: RwLock<StoreState>,
    fail_next: AtomicU32,
    latency_ms: AtomicU64,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Delay every call by `latency` before it touches state.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an object is stored under `key`.
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.state
            .read()
            .map(|s| s.objects.contains_key(key))
            .unwrap_or(false)
    }

    /// Number of multipart uploads neither completed nor aborted.
    pub fn open_uploads(&self) -> usize {
        self.state.read().map(|s| s.uploads.len()).unwrap_or(0)
    }

    async fn preflight(&self, op: &str) -> StoreResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable(format!("injected fault in {op}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &ObjectKey, data: Bytes) -> StoreResult<ObjectMeta> {
        self.preflight("put").await?;
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.store(key, data))
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        self.preflight("get").await?;
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        state
            .objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn head(&self, key: &ObjectKey) -> StoreResult<Option<ObjectMeta>> {
        self.preflight("head").await?;
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.objects.get(key).map(|o| ObjectMeta {
            key: key.clone(),
            size: o.data.len() as u64,
            etag: o.etag.clone(),
            last_modified: o.last_modified,
        }))
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        self.preflight("delete").await?;
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        state.objects.remove(key);
        Ok(())
    }

    async fn create_multipart(&self, key: &ObjectKey) -> StoreResult<UploadId> {
        self.preflight("create_multipart").await?;
        let upload = UploadId::new(uuid::Uuid::now_v7().to_string());
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        state.uploads.insert(
            upload.clone(),
            PendingUpload {
                key: key.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload)
    }

    async fn upload_part(
        &self,
        upload: &UploadId,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<CompletedPart> {
        self.preflight("upload_part").await?;
        if part_number == 0 {
            return Err(StoreError::InvalidPart {
                upload_id: upload.to_string(),
                part_number,
                reason: "part numbers start at 1".into(),
            });
        }
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        let etag = state.next_etag();
        let pending = state
            .uploads
            .get_mut(upload)
            .ok_or_else(|| StoreError::UploadNotFound(upload.to_string()))?;
        let size = data.len() as u64;
        // Re-uploading a part number replaces it.
        pending.parts.insert(part_number, (etag.clone(), data));
        Ok(CompletedPart {
            part_number,
            etag,
            size,
        })
    }

    async fn complete_multipart(
        &self,
        upload: &UploadId,
        mut parts: Vec<CompletedPart>,
    ) -> StoreResult<ObjectMeta> {
        self.preflight("complete_multipart").await?;
        parts.sort_by_key(|p| p.part_number);

        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        let pending = state
            .uploads
            .get(upload)
            .ok_or_else(|| StoreError::UploadNotFound(upload.to_string()))?;

        let mut assembled = BytesMut::new();
        for part in &parts {
            match pending.parts.get(&part.part_number) {
                Some((etag, data)) if *etag == part.etag => assembled.extend_from_slice(data),
                Some(_) => {
                    return Err(StoreError::InvalidPart {
                        upload_id: upload.to_string(),
                        part_number: part.part_number,
                        reason: "etag mismatch".into(),
                    })
                }
                None => {
                    return Err(StoreError::InvalidPart {
                        upload_id: upload.to_string(),
                        part_number: part.part_number,
                        reason: "part was never uploaded".into(),
                    })
                }
            }
        }

        let key = pending.key.clone();
        state.uploads.remove(upload);
        Ok(state.store(&key, assembled.freeze()))
    }

    async fn abort_multipart(&self, upload: &UploadId) -> StoreResult<()> {
        self.preflight("abort_multipart").await?;
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        state.uploads.remove(upload);
        Ok(())
    }
}
