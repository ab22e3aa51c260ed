//! Background registration work with at-least-once delivery.
//!
//! - [`RegistrationJob`]: what to do
//! - [`JobEnvelope`]: serializable dispatch payload with an attempt counter
//! - [`TaskQueue`]: where envelopes go
//! - [`InProcessTaskQueue`] + [`JobWorker`]: a tokio channel and the loop
//!   that drains it back into the engine
//!
//! Every job is safe to run twice: the engine treats redelivered
//! completions and commits as no-ops.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ebdms_types::{Checksum, FileId, ObjectKey, RecordId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::engine::RegistrationEngine;
use crate::error::{RegistryError, RegistryResult};
use crate::retry::backoff_delay;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistrationJob {
    CompleteUpload {
        object_key: ObjectKey,
        checksum: Checksum,
    },
    Commit {
        object_key: ObjectKey,
        reference: Option<RecordId>,
    },
    PurgeObject {
        file_id: FileId,
        object_key: ObjectKey,
    },
}

impl RegistrationJob {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CompleteUpload { .. } => "complete_upload",
            Self::Commit { .. } => "commit",
            Self::PurgeObject { .. } => "purge_object",
        }
    }
}

/// A job plus its delivery bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_id: Uuid,
    pub job: RegistrationJob,
    /// Delivery number, starting at 1.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl JobEnvelope {
    pub fn new(job: RegistrationJob) -> Self {
        Self {
            job_id: Uuid::now_v7(),
            job,
            attempt: 1,
            enqueued_at: Utc::now(),
        }
    }

    /// The same job, one delivery later.
    pub fn redelivery(&self) -> Self {
        Self {
            job_id: self.job_id,
            job: self.job.clone(),
            attempt: self.attempt + 1,
            enqueued_at: Utc::now(),
        }
    }
}

/// Backend-agnostic job sink.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, envelope: JobEnvelope) -> RegistryResult<()>;
}

/// Unbounded in-process queue backed by a tokio channel.
#[derive(Clone)]
pub struct InProcessTaskQueue {
    sender: mpsc::UnboundedSender<JobEnvelope>,
}

impl InProcessTaskQueue {
    /// The queue and the receiving half a [`JobWorker`] drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<JobEnvelope>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl TaskQueue for InProcessTaskQueue {
    async fn enqueue(&self, envelope: JobEnvelope) -> RegistryResult<()> {
        tracing::debug!(job_id = %envelope.job_id, job = envelope.job.name(), attempt = envelope.attempt, "job enqueued");
        self.sender
            .send(envelope)
            .map_err(|_| RegistryError::Internal("job worker has shut down".into()))
    }
}

/// Counters from one drain of the queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: u64,
    pub redelivered: u64,
    pub dropped: u64,
}

enum Outcome {
    Completed,
    Redelivered,
    Dropped,
}

/// Runs queued jobs against the engine.
///
/// Retryable failures are put back on the queue with `attempt + 1` until
/// `max_deliveries` is reached; anything else is dropped with an error log.
pub struct JobWorker {
    engine: Arc<RegistrationEngine>,
    queue: Arc<dyn TaskQueue>,
    receiver: mpsc::UnboundedReceiver<JobEnvelope>,
    max_deliveries: u32,
}

impl JobWorker {
    pub fn new(
        engine: Arc<RegistrationEngine>,
        queue: Arc<dyn TaskQueue>,
        receiver: mpsc::UnboundedReceiver<JobEnvelope>,
    ) -> Self {
        let max_deliveries = engine.config().jobs.max_deliveries;
        Self {
            engine,
            queue,
            receiver,
            max_deliveries,
        }
    }

    async fn execute(&self, job: &RegistrationJob) -> RegistryResult<()> {
        match job {
            RegistrationJob::CompleteUpload {
                object_key,
                checksum,
            } => self.engine.complete_upload(object_key, checksum).await.map(|_| ()),
            RegistrationJob::Commit {
                object_key,
                reference,
            } => self.engine.commit(object_key, *reference).await.map(|_| ()),
            RegistrationJob::PurgeObject {
                file_id,
                object_key,
            } => self.engine.purge_object(file_id, object_key).await,
        }
    }

    async fn process(&self, envelope: JobEnvelope) -> Outcome {
        let err = match self.execute(&envelope.job).await {
            Ok(()) => {
                tracing::debug!(job_id = %envelope.job_id, job = envelope.job.name(), "job completed");
                return Outcome::Completed;
            }
            Err(e) => e,
        };

        if err.is_retryable() && envelope.attempt < self.max_deliveries {
            let delay = backoff_delay(&self.engine.config().retry, envelope.attempt);
            tracing::warn!(
                job_id = %envelope.job_id,
                job = envelope.job.name(),
                attempt = envelope.attempt,
                error = %err,
                "job failed, redelivering"
            );
            tokio::time::sleep(delay).await;
            match self.queue.enqueue(envelope.redelivery()).await {
                Ok(()) => return Outcome::Redelivered,
                Err(e) => tracing::error!(job_id = %envelope.job_id, error = %e, "redelivery failed"),
            }
        }
        tracing::error!(
            job_id = %envelope.job_id,
            job = envelope.job.name(),
            attempt = envelope.attempt,
            error = %err,
            "job dropped"
        );
        Outcome::Dropped
    }

    fn tally(stats: &mut WorkerStats, outcome: Outcome) {
        match outcome {
            Outcome::Completed => stats.completed += 1,
            Outcome::Redelivered => stats.redelivered += 1,
            Outcome::Dropped => stats.dropped += 1,
        }
    }

    /// Process jobs until the queue is momentarily empty.
    pub async fn run_until_idle(&mut self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        while let Ok(envelope) = self.receiver.try_recv() {
            let outcome = self.process(envelope).await;
            Self::tally(&mut stats, outcome);
        }
        stats
    }

    /// Process jobs until every sender is gone.
    pub fn spawn(mut self) -> JoinHandle<WorkerStats> {
        tokio::spawn(async move {
            let mut stats = WorkerStats::default();
            while let Some(envelope) = self.receiver.recv().await {
                let outcome = self.process(envelope).await;
                Self::tally(&mut stats, outcome);
            }
            stats
        })
    }
}
