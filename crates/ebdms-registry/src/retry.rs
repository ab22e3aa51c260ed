//! Bounded, jittered retry with a per-attempt deadline.
//!
//! Every adapter call the engine makes goes through [`retry_transient`]:
//! each attempt runs under `tokio::time::timeout`, transient failures and
//! timeouts back off exponentially, everything else returns at once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ebdms_catalog::CatalogError;
use ebdms_store::{CompletedPart, ObjectMeta, ObjectStore, StoreError, StoreResult, UploadId};
use ebdms_types::ObjectKey;
use rand::Rng;

use crate::config::RetryConfig;
use crate::error::RegistryError;

/// Errors a retry loop can classify.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

impl Transient for CatalogError {
    fn is_transient(&self) -> bool {
        CatalogError::is_transient(self)
    }
}

/// Why a retried call gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The last attempt did not finish before its deadline.
    TimedOut {
        operation: &'static str,
        after: Duration,
    },
    Failed(E),
}

impl<E> From<RetryError<E>> for RegistryError
where
    E: Into<RegistryError>,
{
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::TimedOut { operation, after } => RegistryError::Timeout {
                operation: operation.to_string(),
                elapsed_ms: after.as_millis() as u64,
            },
            RetryError::Failed(e) => e.into(),
        }
    }
}

/// Delay before attempt `attempt + 1` (1-based `attempt`).
pub fn backoff_delay(policy: &RetryConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let delay = policy
        .base_delay()
        .saturating_mul(1u32 << exp)
        .min(policy.max_delay());
    if policy.jitter && !delay.is_zero() {
        // Equal jitter: half fixed, half random.
        let half = delay / 2;
        let spread = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
        half + Duration::from_millis(spread)
    } else {
        delay
    }
}

/// Run `call` until it succeeds, fails permanently, or the attempt budget
/// runs out.
pub async fn retry_transient<T, E, F, Fut>(
    policy: &RetryConfig,
    deadline: Duration,
    operation: &'static str,
    mut call: F,
) -> Result<T, RetryError<E>>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(deadline, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !e.is_transient() => return Err(RetryError::Failed(e)),
            Ok(Err(e)) => RetryError::Failed(e),
            Err(_) => RetryError::TimedOut {
                operation,
                after: deadline,
            },
        };
        if attempt >= max_attempts {
            tracing::warn!(operation, attempt, "retries exhausted");
            return Err(outcome);
        }
        let delay = backoff_delay(policy, attempt);
        match &outcome {
            RetryError::Failed(e) => {
                tracing::warn!(operation, attempt, error = %e, delay_ms = delay.as_millis() as u64, "transient failure, retrying")
            }
            RetryError::TimedOut { .. } => {
                tracing::warn!(operation, attempt, delay_ms = delay.as_millis() as u64, "attempt timed out, retrying")
            }
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// [`ObjectStore`] decorator applying the retry policy to every call.
///
/// Handed to the multipart uploader so each part gets its own retries and
/// deadline. A final timeout surfaces as [`StoreError::Unavailable`].
pub struct RetryingObjectStore {
    inner: Arc<dyn ObjectStore>,
    policy: RetryConfig,
    deadline: Duration,
}

impl RetryingObjectStore {
    pub fn new(inner: Arc<dyn ObjectStore>, policy: RetryConfig, deadline: Duration) -> Self {
        Self {
            inner,
            policy,
            deadline,
        }
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        retry_transient(&self.policy, self.deadline, operation, call)
            .await
            .map_err(|e| match e {
                RetryError::Failed(e) => e,
                RetryError::TimedOut { operation, after } => StoreError::Unavailable(format!(
                    "{operation} timed out after {} ms",
                    after.as_millis()
                )),
            })
    }
}

#[async_trait]
impl ObjectStore for RetryingObjectStore {
    async fn put(&self, key: &ObjectKey, data: Bytes) -> StoreResult<ObjectMeta> {
        self.run("store.put", || self.inner.put(key, data.clone())).await
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        self.run("store.get", || self.inner.get(key)).await
    }

    async fn head(&self, key: &ObjectKey) -> StoreResult<Option<ObjectMeta>> {
        self.run("store.head", || self.inner.head(key)).await
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        self.run("store.delete", || self.inner.delete(key)).await
    }

    async fn create_multipart(&self, key: &ObjectKey) -> StoreResult<UploadId> {
        self.run("store.create_multipart", || self.inner.create_multipart(key))
            .await
    }

    async fn upload_part(
        &self,
        upload: &UploadId,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<CompletedPart> {
        self.run("store.upload_part", || {
            self.inner.upload_part(upload, part_number, data.clone())
        })
        .await
    }

    async fn complete_multipart(
        &self,
        upload: &UploadId,
        parts: Vec<CompletedPart>,
    ) -> StoreResult<ObjectMeta> {
        self.run("store.complete_multipart", || {
            self.inner.complete_multipart(upload, parts.clone())
        })
        .await
    }

    async fn abort_multipart(&self, upload: &UploadId) -> StoreResult<()> {
        self.run("store.abort_multipart", || self.inner.abort_multipart(upload))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use ebdms_store::InMemoryObjectStore;

    use super::*;

    #[derive(Debug)]
    struct Flaky(bool);

    impl Transient for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky({})", self.0)
        }
    }

    const DEADLINE: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = retry_transient(&RetryConfig::immediate(3), DEADLINE, "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Flaky(true))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient(&RetryConfig::immediate(3), DEADLINE, "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(true)) }
        })
        .await;
        assert!(matches!(result, Err(RetryError::Failed(Flaky(true)))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient(&RetryConfig::immediate(3), DEADLINE, "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(false)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let result: Result<(), RetryError<Flaky>> = retry_transient(
            &RetryConfig::immediate(2),
            Duration::from_millis(10),
            "catalog.slow",
            || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            },
        )
        .await;
        let err: RegistryError = match result {
            Err(RetryError::TimedOut { operation, after }) => RetryError::<StoreError>::TimedOut { operation, after }.into(),
            other => panic!("expected timeout, got {other:?}"),
        };
        assert!(matches!(err, RegistryError::Timeout { ref operation, .. } if operation == "catalog.slow"));
        assert_eq!(err.http_status(), 504);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryConfig {
            max_attempts: 10,
            base_delay_ms: 200,
            max_delay_ms: 1_000,
            jitter: false,
        };
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(&policy, 3), Duration::from_millis(800));
        assert_eq!(backoff_delay(&policy, 4), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(&policy, 40), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryConfig::default();
        for attempt in 1..5 {
            let unjittered = backoff_delay(
                &RetryConfig {
                    jitter: false,
                    ..policy.clone()
                },
                attempt,
            );
            let d = backoff_delay(&policy, attempt);
            assert!(d >= unjittered / 2 && d <= unjittered);
        }
    }

    #[tokio::test]
    async fn retrying_store_absorbs_injected_faults() {
        let inner = Arc::new(InMemoryObjectStore::new());
        let store = RetryingObjectStore::new(inner.clone(), RetryConfig::immediate(3), DEADLINE);
        let key = ObjectKey::from_raw("files/p1/k").unwrap();

        inner.fail_next(2);
        store.put(&key, Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Bytes::from_static(b"abc"));

        inner.fail_next(3);
        assert!(matches!(
            store.head(&key).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
