//! PostgreSQL job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::errors::JobStoreError;
use crate::interfaces::JobStore;
use crate::types::{JobStatus, NewJob, StoredJob};

/// Durable job queue in the `search_jobs` table.
///
/// Workers claim jobs with `FOR UPDATE SKIP LOCKED`, so any number of worker
/// processes can poll the same queues without claiming a job twice.
#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    queue: String,
    payload: Value,
    timeout_secs: i64,
    max_retries: i32,
    retry_backoff: bool,
    attempts: i32,
}

impl From<JobRow> for StoredJob {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id,
            queue: row.queue,
            payload: row.payload,
            timeout_secs: row.timeout_secs.unsigned_abs(),
            max_retries: row.max_retries.unsigned_abs(),
            retry_backoff: row.retry_backoff,
            attempts: row.attempts.unsigned_abs(),
        }
    }
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or upgrade the `search_jobs` table.
    pub async fn run_migrations(&self) -> Result<(), JobStoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Job store migrations applied");
        Ok(())
    }

    async fn update_claimed(
        &self,
        id: i64,
        status: JobStatus,
        run_at: Option<DateTime<Utc>>,
        error: Option<&str>,
    ) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            "UPDATE search_jobs
             SET status = $2,
                 run_at = COALESCE($3, run_at),
                 last_error = COALESCE($4, last_error),
                 claimed_at = CASE WHEN $2 = 'queued' THEN NULL ELSE claimed_at END,
                 finished_at = CASE WHEN $2 IN ('succeeded', 'failed') THEN now() ELSE NULL END
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(run_at)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn enqueue(&self, job: NewJob) -> Result<i64, JobStoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO search_jobs (queue, payload, timeout_secs, max_retries, retry_backoff, run_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(&job.queue)
        .bind(&job.payload)
        .bind(i64::try_from(job.timeout_secs).unwrap_or(i64::MAX))
        .bind(i32::try_from(job.max_retries).unwrap_or(i32::MAX))
        .bind(job.retry_backoff)
        .bind(job.run_at)
        .fetch_one(&self.pool)
        .await?;

        debug!(job_id = id, queue = %job.queue, "Enqueued job");
        Ok(id)
    }

    async fn claim_next(&self, queues: &[String]) -> Result<Option<StoredJob>, JobStoreError> {
        let row: Option<JobRow> = sqlx::query_as(
            "UPDATE search_jobs
             SET status = 'running', attempts = attempts + 1, claimed_at = now()
             WHERE id = (
                 SELECT id FROM search_jobs
                 WHERE status = 'queued' AND queue = ANY($1) AND run_at <= now()
                 ORDER BY run_at, id
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, queue, payload, timeout_secs, max_retries, retry_backoff, attempts",
        )
        .bind(queues)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(StoredJob::from))
    }

    async fn mark_succeeded(&self, id: i64) -> Result<(), JobStoreError> {
        self.update_claimed(id, JobStatus::Succeeded, None, None).await
    }

    async fn schedule_retry(
        &self,
        id: i64,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), JobStoreError> {
        self.update_claimed(id, JobStatus::Queued, Some(run_at), Some(error))
            .await
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), JobStoreError> {
        self.update_claimed(id, JobStatus::Failed, None, Some(error))
            .await
    }

    async fn requeue_abandoned(&self) -> Result<u64, JobStoreError> {
        let statuses: Vec<String> = sqlx::query_scalar(
            "UPDATE search_jobs
             SET status = CASE WHEN attempts > max_retries THEN 'failed' ELSE 'queued' END,
                 claimed_at = NULL,
                 finished_at = CASE WHEN attempts > max_retries THEN now() ELSE NULL END,
                 last_error = CASE
                     WHEN attempts > max_retries
                         THEN 'abandoned by its worker after ' || attempts || ' attempts'
                     ELSE last_error
                 END
             WHERE status = 'running'
               AND claimed_at < now() - make_interval(secs => timeout_secs * 2)
             RETURNING status",
        )
        .fetch_all(&self.pool)
        .await?;

        let requeued = statuses.iter().filter(|status| *status == "queued").count() as u64;
        let failed = statuses.len() as u64 - requeued;
        if requeued > 0 || failed > 0 {
            info!(requeued, failed, "Handled abandoned jobs");
        }
        Ok(requeued)
    }
}
