use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use ebdms_types::ObjectKey;

use crate::error::StoreResult;

/// Metadata about a stored object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: ObjectKey,
    pub size: u64,
    /// Opaque version token; changes on every overwrite.
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

/// Handle of an in-progress multipart upload.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct UploadId(String);

impl UploadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receipt for one uploaded part, handed back at completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based, as in S3.
    pub part_number: u32,
    pub etag: String,
    pub size: u64,
}

/// S3-style object store.
///
/// All implementations must satisfy these invariants:
/// - An object becomes readable only once `put` or `complete_multipart`
///   returns; uploaded parts are never visible on their own.
/// - `delete` is idempotent.
/// - The store never interprets object contents.
/// - Transient backend failures surface as [`StoreError::Unavailable`](crate::StoreError::Unavailable)
///   so callers can retry them; everything else is permanent.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Write a whole object in one request, replacing any previous version.
    async fn put(&self, key: &ObjectKey, data: Bytes) -> StoreResult<ObjectMeta>;

    /// Read an entire object. Fails with `NotFound` if absent.
    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes>;

    /// Object metadata without the body; `None` if absent.
    async fn head(&self, key: &ObjectKey) -> StoreResult<Option<ObjectMeta>>;

    /// Remove an object. Succeeds when the object does not exist.
    async fn delete(&self, key: &ObjectKey) -> StoreResult<()>;

    /// Start a multipart upload targeting `key`.
    async fn create_multipart(&self, key: &ObjectKey) -> StoreResult<UploadId>;

    /// Upload one part. Parts may arrive in any order and concurrently.
    async fn upload_part(
        &self,
        upload: &UploadId,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<CompletedPart>;

    /// Assemble the listed parts, in part-number order, into the object.
    async fn complete_multipart(
        &self,
        upload: &UploadId,
        parts: Vec<CompletedPart>,
    ) -> StoreResult<ObjectMeta>;

    /// Discard an upload and its parts. Idempotent.
    async fn abort_multipart(&self, upload: &UploadId) -> StoreResult<()>;
}
