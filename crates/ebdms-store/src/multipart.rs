use std::io;
use std::pin::Pin;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use ebdms_types::ObjectKey;
use futures_util::stream::{FuturesUnordered, Stream};
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use crate::error::{StoreError, StoreResult};
use crate::traits::{CompletedPart, ObjectMeta, ObjectStore, UploadId};

/// A payload as handed over by the HTTP layer: a fallible stream of chunks.
pub type PayloadStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Default part size (8 MiB), S3's conventional multipart chunk.
pub const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;

/// Wrap an in-memory buffer as a [`PayloadStream`] of `chunk_size` pieces.
pub fn payload_from_bytes(data: Bytes, chunk_size: usize) -> PayloadStream {
    let chunk_size = chunk_size.max(1);
    let mut chunks: Vec<io::Result<Bytes>> = Vec::new();
    let mut rest = data;
    while rest.len() > chunk_size {
        chunks.push(Ok(rest.split_to(chunk_size)));
    }
    if !rest.is_empty() {
        chunks.push(Ok(rest));
    }
    Box::pin(futures_util::stream::iter(chunks))
}

/// Drain a payload stream into one buffer.
pub async fn collect_payload(mut payload: PayloadStream) -> io::Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// Outcome of a multipart upload.
#[derive(Clone, Debug)]
pub struct UploadSummary {
    pub meta: ObjectMeta,
    pub parts: usize,
    pub bytes: u64,
}

/// Streams a payload into the store as a multipart upload.
///
/// Incoming chunks are re-cut into `part_size` parts and up to
/// `concurrency` parts are in flight at once. The object only appears when
/// every part has landed and the upload is completed; on any failure the
/// upload is aborted and nothing becomes visible.
pub struct MultipartUploader {
    store: Arc<dyn ObjectStore>,
    part_size: usize,
    concurrency: usize,
}

impl MultipartUploader {
    pub fn new(store: Arc<dyn ObjectStore>, part_size: usize, concurrency: usize) -> Self {
        Self {
            store,
            part_size: part_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    pub async fn upload(&self, key: &ObjectKey, payload: PayloadStream) -> StoreResult<UploadSummary> {
        let upload = self.store.create_multipart(key).await?;
        match self.upload_parts(&upload, payload).await {
            Ok((parts, bytes)) => {
                let count = parts.len();
                let meta = match self.store.complete_multipart(&upload, parts).await {
                    Ok(meta) => meta,
                    Err(e) => {
                        self.abort_quietly(&upload).await;
                        return Err(e);
                    }
                };
                tracing::debug!(object_key = %key, parts = count, bytes, "multipart upload completed");
                Ok(UploadSummary {
                    meta,
                    parts: count,
                    bytes,
                })
            }
            Err(e) => {
                tracing::warn!(object_key = %key, error = %e, "multipart upload failed, aborting");
                self.abort_quietly(&upload).await;
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        upload: &UploadId,
        payload: PayloadStream,
    ) -> StoreResult<(Vec<CompletedPart>, u64)> {
        let mut in_flight = FuturesUnordered::new();
        let result = self.drive_parts(upload, payload, &mut in_flight).await;
        if result.is_err() && !in_flight.is_empty() {
            // Parts still running would write into an aborted upload.
            for handle in in_flight.iter() {
                handle.abort();
            }
            tracing::debug!(upload_id = %upload, pending = in_flight.len(), "cancelled in-flight parts");
        }
        result
    }

    async fn drive_parts(
        &self,
        upload: &UploadId,
        mut payload: PayloadStream,
        in_flight: &mut FuturesUnordered<JoinHandle<StoreResult<CompletedPart>>>,
    ) -> StoreResult<(Vec<CompletedPart>, u64)> {
        let mut completed = Vec::new();
        let mut buffer = BytesMut::new();
        let mut next_part = 1u32;
        let mut total = 0u64;

        while let Some(chunk) = payload.next().await {
            let chunk = chunk?;
            total += chunk.len() as u64;
            buffer.extend_from_slice(&chunk);

            while buffer.len() >= self.part_size {
                let part = buffer.split_to(self.part_size).freeze();
                in_flight.push(tokio::spawn(self.send_part(upload.clone(), next_part, part)));
                next_part += 1;

                if in_flight.len() >= self.concurrency {
                    if let Some(done) = in_flight.next().await {
                        completed.push(joined(done)?);
                    }
                }
            }
        }

        // Trailing bytes, or a single empty part for an empty payload.
        if !buffer.is_empty() || next_part == 1 {
            in_flight.push(tokio::spawn(self.send_part(
                upload.clone(),
                next_part,
                buffer.freeze(),
            )));
        }

        while let Some(done) = in_flight.next().await {
            completed.push(joined(done)?);
        }
        Ok((completed, total))
    }

    fn send_part(
        &self,
        upload: UploadId,
        part_number: u32,
        data: Bytes,
    ) -> impl std::future::Future<Output = StoreResult<CompletedPart>> + Send + 'static {
        let store = Arc::clone(&self.store);
        async move { store.upload_part(&upload, part_number, data).await }
    }

    async fn abort_quietly(&self, upload: &UploadId) {
        if let Err(e) = self.store.abort_multipart(upload).await {
            tracing::warn!(upload_id = %upload, error = %e, "abort of multipart upload failed");
        }
    }
}

fn joined(
    result: Result<StoreResult<CompletedPart>, tokio::task::JoinError>,
) -> StoreResult<CompletedPart> {
    result.map_err(|e| StoreError::Io(io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::memory::InMemoryObjectStore;

    fn key() -> ObjectKey {
        ObjectKey::from_raw("omics/P1/2026/01/01/multipart").unwrap()
    }

    fn pattern(len: usize) -> Bytes {
        (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
    }

    #[tokio::test]
    async fn uploads_in_parts_and_reassembles_in_order() {
        let store = Arc::new(InMemoryObjectStore::new());
        let uploader = MultipartUploader::new(store.clone(), 1000, 3);
        let data = pattern(10_500);

        let summary = uploader
            .upload(&key(), payload_from_bytes(data.clone(), 777))
            .await
            .unwrap();

        assert_eq!(summary.parts, 11);
        assert_eq!(summary.bytes, 10_500);
        assert_eq!(store.get(&key()).await.unwrap(), data);
        assert_eq!(store.open_uploads(), 0);
    }

    #[tokio::test]
    async fn empty_payload_creates_empty_object() {
        let store = Arc::new(InMemoryObjectStore::new());
        let uploader = MultipartUploader::new(store.clone(), 1000, 2);
        let summary = uploader
            .upload(&key(), payload_from_bytes(Bytes::new(), 10))
            .await
            .unwrap();
        assert_eq!(summary.bytes, 0);
        assert_eq!(store.head(&key()).await.unwrap().unwrap().size, 0);
    }

    #[tokio::test]
    async fn broken_stream_aborts_and_leaves_nothing_visible() {
        let store = Arc::new(InMemoryObjectStore::new());
        let uploader = MultipartUploader::new(store.clone(), 100, 1);
        let broken: PayloadStream = Box::pin(futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away")),
        ]));
        let err = uploader.upload(&key(), broken).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(store.head(&key()).await.unwrap().is_none());
        assert_eq!(store.open_uploads(), 0);

        // A clean retry succeeds.
        uploader
            .upload(&key(), payload_from_bytes(pattern(500), 100))
            .await
            .unwrap();
        assert_eq!(store.head(&key()).await.unwrap().unwrap().size, 500);
    }

    /// Counts part uploads that got to run at all.
    struct CountingStore {
        inner: InMemoryObjectStore,
        parts_started: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for CountingStore {
        async fn put(&self, key: &ObjectKey, data: Bytes) -> StoreResult<ObjectMeta> {
            self.inner.put(key, data).await
        }
        async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
            self.inner.get(key).await
        }
        async fn head(&self, key: &ObjectKey) -> StoreResult<Option<ObjectMeta>> {
            self.inner.head(key).await
        }
        async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
            self.inner.delete(key).await
        }
        async fn create_multipart(&self, key: &ObjectKey) -> StoreResult<UploadId> {
            self.inner.create_multipart(key).await
        }
        async fn upload_part(&self, upload: &UploadId, part_number: u32, data: Bytes) -> StoreResult<CompletedPart> {
            self.parts_started.fetch_add(1, Ordering::SeqCst);
            self.inner.upload_part(upload, part_number, data).await
        }
        async fn complete_multipart(&self, upload: &UploadId, parts: Vec<CompletedPart>) -> StoreResult<ObjectMeta> {
            self.inner.complete_multipart(upload, parts).await
        }
        async fn abort_multipart(&self, upload: &UploadId) -> StoreResult<()> {
            self.inner.abort_multipart(upload).await
        }
    }

    #[tokio::test]
    async fn failed_stream_cancels_parts_still_in_flight() {
        let store = Arc::new(CountingStore {
            inner: InMemoryObjectStore::new(),
            parts_started: AtomicUsize::new(0),
        });
        let uploader = MultipartUploader::new(store.clone(), 100, 8);
        let broken: PayloadStream = Box::pin(futures_util::stream::iter(vec![
            Ok(pattern(100)),
            Ok(pattern(100)),
            Ok(pattern(100)),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away")),
        ]));

        assert!(uploader.upload(&key(), broken).await.is_err());
        // Give any detached part task a chance to run.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.parts_started.load(Ordering::SeqCst), 0);
        assert_eq!(store.inner.open_uploads(), 0);
        assert!(store.inner.head(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn collect_payload_concatenates_chunks() {
        let data = pattern(2048);
        let collected = collect_payload(payload_from_bytes(data.clone(), 100))
            .await
            .unwrap();
        assert_eq!(collected, data);
    }
}
