//! In-memory job store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::errors::JobStoreError;
use crate::interfaces::JobStore;
use crate::types::{JobStatus, NewJob, StoredJob};

/// Snapshot of one job, for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: i64,
    pub queue: String,
    pub payload: Value,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_retries: u32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct Entry {
    job: NewJob,
    status: JobStatus,
    attempts: u32,
    claimed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Jobs {
    next_id: i64,
    entries: BTreeMap<i64, Entry>,
}

/// [`JobStore`] held in memory. Jobs do not survive the process.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    state: Mutex<Jobs>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Jobs> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every job, in enqueue order.
    pub fn jobs(&self) -> Vec<JobRecord> {
        self.state()
            .entries
            .iter()
            .map(|(id, entry)| JobRecord {
                id: *id,
                queue: entry.job.queue.clone(),
                payload: entry.job.payload.clone(),
                status: entry.status,
                attempts: entry.attempts,
                max_retries: entry.job.max_retries,
                run_at: entry.job.run_at,
                last_error: entry.last_error.clone(),
            })
            .collect()
    }

    /// Jobs with the given status, in enqueue order.
    pub fn jobs_with_status(&self, status: JobStatus) -> Vec<JobRecord> {
        self.jobs()
            .into_iter()
            .filter(|job| job.status == status)
            .collect()
    }

    /// Make every queued job due now, skipping any retry delay.
    pub fn make_all_due(&self) {
        let now = Utc::now();
        for entry in self.state().entries.values_mut() {
            if entry.status == JobStatus::Queued && entry.job.run_at > now {
                entry.job.run_at = now;
            }
        }
    }

    fn transition(
        &self,
        id: i64,
        status: JobStatus,
        run_at: Option<DateTime<Utc>>,
        error: Option<&str>,
    ) -> Result<(), JobStoreError> {
        let mut state = self.state();
        let entry = state.entries.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        entry.status = status;
        if let Some(run_at) = run_at {
            entry.job.run_at = run_at;
        }
        if let Some(error) = error {
            entry.last_error = Some(error.to_string());
        }
        if status == JobStatus::Queued {
            entry.claimed_at = None;
        }
        Ok(())
    }
}

fn abandoned_error(attempts: u32) -> String {
    format!("abandoned by its worker after {} attempts", attempts)
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: NewJob) -> Result<i64, JobStoreError> {
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        state.entries.insert(
            id,
            Entry {
                job,
                status: JobStatus::Queued,
                attempts: 0,
                claimed_at: None,
                last_error: None,
            },
        );
        Ok(id)
    }

    async fn claim_next(&self, queues: &[String]) -> Result<Option<StoredJob>, JobStoreError> {
        let now = Utc::now();
        let mut state = self.state();

        let next = state
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.status == JobStatus::Queued
                    && entry.job.run_at <= now
                    && queues.contains(&entry.job.queue)
            })
            .min_by_key(|(id, entry)| (entry.job.run_at, **id))
            .map(|(id, _)| *id);

        let Some(id) = next else {
            return Ok(None);
        };
        let Some(entry) = state.entries.get_mut(&id) else {
            return Ok(None);
        };

        entry.status = JobStatus::Running;
        entry.attempts += 1;
        entry.claimed_at = Some(now);

        Ok(Some(StoredJob {
            id,
            queue: entry.job.queue.clone(),
            payload: entry.job.payload.clone(),
            timeout_secs: entry.job.timeout_secs,
            max_retries: entry.job.max_retries,
            retry_backoff: entry.job.retry_backoff,
            attempts: entry.attempts,
        }))
    }

    async fn mark_succeeded(&self, id: i64) -> Result<(), JobStoreError> {
        self.transition(id, JobStatus::Succeeded, None, None)
    }

    async fn schedule_retry(
        &self,
        id: i64,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), JobStoreError> {
        self.transition(id, JobStatus::Queued, Some(run_at), Some(error))
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), JobStoreError> {
        self.transition(id, JobStatus::Failed, None, Some(error))
    }

    async fn requeue_abandoned(&self) -> Result<u64, JobStoreError> {
        let now = Utc::now();
        let mut requeued = 0;
        for entry in self.state().entries.values_mut() {
            let deadline = entry.claimed_at.map(|claimed| {
                let timeout = i64::try_from(entry.job.timeout_secs).unwrap_or(i64::MAX / 2);
                claimed + Duration::seconds(timeout.saturating_mul(2))
            });
            if entry.status != JobStatus::Running || !deadline.is_some_and(|d| d < now) {
                continue;
            }
            entry.claimed_at = None;
            if entry.attempts > entry.job.max_retries {
                entry.status = JobStatus::Failed;
                entry.last_error = Some(abandoned_error(entry.attempts));
            } else {
                entry.status = JobStatus::Queued;
                requeued += 1;
            }
        }
        Ok(requeued)
    }
}
