//! Queue + result store contract shared by the API, the CLI and the worker.
//!
//! The channel is a FIFO of serialized [`Job`] envelopes with a destructive
//! pop: once popped, a job is gone whether or not a worker finishes it. A
//! worker that dies between pop and [`JobStore::complete`] leaves the record
//! at PENDING forever. There is no lease or acknowledgement.

use crate::types::{Job, JobKind, ResultRecord, TestResult, Verdict};
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Malformed result record for {id}: {reason}")]
    Malformed { id: Uuid, reason: String },
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create the record with `status=PENDING`
    async fn create_pending(&self, id: &Uuid) -> Result<(), StoreError>;

    /// Append a job envelope to the tail of the channel
    async fn push(&self, job: &Job) -> Result<(), StoreError>;

    /// Blocking pop from the head, waiting at most `timeout`.
    /// Returns the raw envelope so the caller owns deserialization.
    async fn pop(&self, timeout: Duration) -> Result<Option<String>, StoreError>;

    /// Write `status=DONE`, verdict and results in one atomic operation
    async fn complete(
        &self,
        id: &Uuid,
        verdict: Verdict,
        results: &[TestResult],
    ) -> Result<(), StoreError>;

    /// Read the record; `None` means the id was never enqueued (or has expired)
    async fn fetch(&self, id: &Uuid) -> Result<Option<ResultRecord>, StoreError>;

    /// Delete the record so the id reads as unknown again
    async fn discard(&self, id: &Uuid) -> Result<(), StoreError>;
}

/// Producer side: record first, then push, so a poll right after this
/// returns sees PENDING rather than an unknown id. If the push fails the
/// record is discarded again; no PENDING record outlives a job that was
/// never queued.
pub async fn enqueue<S>(
    store: &S,
    kind: JobKind,
    problem_id: &str,
    source_code: &str,
) -> Result<Uuid, StoreError>
where
    S: JobStore + ?Sized,
{
    let job = Job::new(kind, problem_id, source_code);
    store.create_pending(&job.id).await?;
    if let Err(e) = store.push(&job).await {
        if let Err(cleanup) = store.discard(&job.id).await {
            tracing::warn!(job_id = %job.id, error = %cleanup, "Failed to discard unqueued record");
        }
        return Err(e);
    }

    tracing::info!(
        job_id = %job.id,
        kind = %kind,
        problem_id = %problem_id,
        source_size = source_code.len(),
        "Job queued"
    );

    Ok(job.id)
}

/// Poller side: `Ok(None)` is the "unknown submission" answer, not an error
pub async fn poll<S>(store: &S, id: &Uuid) -> Result<Option<ResultRecord>, StoreError>
where
    S: JobStore + ?Sized,
{
    store.fetch(id).await
}
