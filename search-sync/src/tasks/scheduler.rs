//! Job scheduling.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use search_sync_repository::{JobStore, NewJob};
use tracing::info;

use super::jobs::{JobOptions, SearchJob};
use crate::errors::SearchSyncError;

/// Hands jobs over for asynchronous execution.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Schedule a job and return its id.
    async fn schedule(&self, job: SearchJob, options: JobOptions) -> Result<i64, SearchSyncError>;

    /// Schedule a job with its default options.
    async fn schedule_default(&self, job: SearchJob) -> Result<i64, SearchSyncError> {
        let options = job.default_options();
        self.schedule(job, options).await
    }
}

/// [`JobScheduler`] placing jobs in a [`JobStore`] for workers to claim.
#[derive(Clone)]
pub struct QueuedJobScheduler {
    store: Arc<dyn JobStore>,
}

impl QueuedJobScheduler {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl JobScheduler for QueuedJobScheduler {
    async fn schedule(&self, job: SearchJob, options: JobOptions) -> Result<i64, SearchSyncError> {
        let delay = chrono::Duration::from_std(options.delay)
            .map_err(|e| SearchSyncError::config(format!("invalid job delay: {}", e)))?;

        let id = self
            .store
            .enqueue(NewJob {
                queue: options.queue.clone(),
                payload: serde_json::to_value(&job)?,
                timeout_secs: options.timeout.as_secs(),
                max_retries: options.max_retries,
                retry_backoff: options.retry_backoff,
                run_at: Utc::now() + delay,
            })
            .await?;

        info!(job_id = id, kind = job.kind(), queue = %options.queue, "Scheduled job");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_sync_repository::memory::InMemoryJobStore;
    use search_sync_repository::JobStatus;
    use std::time::Duration;

    #[tokio::test]
    async fn test_schedule_stores_payload_and_options() {
        let store = Arc::new(InMemoryJobStore::new());
        let scheduler = QueuedJobScheduler::new(store.clone());

        let id = scheduler
            .schedule_default(SearchJob::SyncModel {
                app: "company".to_string(),
                batch_size: None,
            })
            .await
            .unwrap();

        let jobs = store.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert_eq!(jobs[0].queue, "long-running");
        assert_eq!(jobs[0].status, JobStatus::Queued);
        assert_eq!(jobs[0].max_retries, 3);
        assert_eq!(jobs[0].payload["type"], "sync_model");
        assert_eq!(jobs[0].payload["app"], "company");
    }

    #[tokio::test]
    async fn test_delayed_job_is_not_due() {
        let store = Arc::new(InMemoryJobStore::new());
        let scheduler = QueuedJobScheduler::new(store.clone());

        let options = JobOptions {
            delay: Duration::from_secs(60),
            ..JobOptions::default()
        };
        scheduler
            .schedule(SearchJob::SyncAllModels { batch_size: None }, options)
            .await
            .unwrap();

        let queues = vec!["long-running".to_string()];
        assert!(store.claim_next(&queues).await.unwrap().is_none());
        store.make_all_due();
        assert!(store.claim_next(&queues).await.unwrap().is_some());
    }
}
