use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::JobStoreError;
use crate::types::{NewJob, StoredJob};

/// Durable queue of background jobs.
///
/// A job is claimed by exactly one worker at a time. A claimed job ends up
/// succeeded, failed, or back in the queue with a later `run_at`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Add a job and return its id.
    async fn enqueue(&self, job: NewJob) -> Result<i64, JobStoreError>;

    /// Claim the next due job on one of the given queues, incrementing its
    /// attempt count. Returns `None` when no job is due.
    async fn claim_next(&self, queues: &[String]) -> Result<Option<StoredJob>, JobStoreError>;

    /// Record that a claimed job completed.
    async fn mark_succeeded(&self, id: i64) -> Result<(), JobStoreError>;

    /// Put a claimed job back in the queue to run again at `run_at`.
    async fn schedule_retry(
        &self,
        id: i64,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), JobStoreError>;

    /// Record that a claimed job failed permanently.
    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), JobStoreError>;

    /// Return jobs whose worker disappeared mid-run to the queue.
    ///
    /// A running job is considered abandoned once twice its timeout has elapsed
    /// since it was claimed. Abandoned jobs that have used up their retries
    /// are marked failed instead. Returns the number of jobs requeued.
    async fn requeue_abandoned(&self) -> Result<u64, JobStoreError>;
}
