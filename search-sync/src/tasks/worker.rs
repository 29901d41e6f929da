//! Background job worker.
//!
//! Claims due jobs from a [`JobStore`], runs them under their timeout and
//! records the outcome, rescheduling retryable failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use search_sync_repository::{JobStore, StoredJob};
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_retry::strategy::{jitter, ExponentialBackoff, FixedInterval};
use tracing::{error, info, instrument, warn};

use super::handlers::run_job;
use super::jobs::{SearchJob, DEFAULT_QUEUE, LONG_RUNNING_QUEUE};
use crate::context::SearchContext;
use crate::errors::SearchSyncError;

/// Upper bound of the delay between two attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(600);

/// Delay between attempts of jobs scheduled without backoff.
const FIXED_RETRY_DELAY: Duration = Duration::from_secs(180);

/// Delay before retry number `attempt` (1-based).
///
/// With backoff the delay doubles from 2s up to ten minutes and is jittered;
/// without it every retry waits three minutes.
pub fn backoff_delay(attempt: u32, retry_backoff: bool) -> Duration {
    let n = attempt.max(1) as usize - 1;
    if retry_backoff {
        ExponentialBackoff::from_millis(2)
            .factor(1000)
            .max_delay(MAX_RETRY_DELAY)
            .map(jitter)
            .nth(n)
            .unwrap_or(MAX_RETRY_DELAY)
    } else {
        FixedInterval::new(FIXED_RETRY_DELAY)
            .nth(n)
            .unwrap_or(FIXED_RETRY_DELAY)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queues to claim jobs from.
    pub queues: Vec<String>,
    /// Wait after finding no due job.
    pub poll_interval: Duration,
    /// Interval of progress logs and abandoned-job recovery.
    pub progress_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queues: vec![DEFAULT_QUEUE.to_string(), LONG_RUNNING_QUEUE.to_string()],
            poll_interval: Duration::from_secs(1),
            progress_interval: Duration::from_secs(30),
        }
    }
}

/// Result of one job attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Retrying { run_at: DateTime<Utc> },
    Failed,
}

/// Counters of job outcomes since the worker started.
#[derive(Debug, Default)]
pub struct WorkerStats {
    succeeded: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
}

impl WorkerStats {
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn record(&self, outcome: &JobOutcome) {
        let counter = match outcome {
            JobOutcome::Succeeded => &self.succeeded,
            JobOutcome::Retrying { .. } => &self.retried,
            JobOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Worker {
    ctx: SearchContext,
    store: Arc<dyn JobStore>,
    config: WorkerConfig,
    shutdown_tx: broadcast::Sender<()>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    pub fn new(ctx: SearchContext, store: Arc<dyn JobStore>, config: WorkerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            ctx,
            store,
            config,
            shutdown_tx,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Ask a running [`Worker::run`] loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Claim and run jobs until no job is due. Returns the number of
    /// attempts made.
    pub async fn run_until_idle(&self) -> Result<usize, SearchSyncError> {
        let mut attempts = 0;
        while self.process_next().await?.is_some() {
            attempts += 1;
        }
        Ok(attempts)
    }

    /// Claim and run the next due job, if any.
    pub async fn process_next(&self) -> Result<Option<(i64, JobOutcome)>, SearchSyncError> {
        let Some(job) = self.store.claim_next(&self.config.queues).await? else {
            return Ok(None);
        };
        let outcome = self.execute(&job).await?;
        self.stats.record(&outcome);
        Ok(Some((job.id, outcome)))
    }

    #[instrument(skip_all, fields(job_id = job.id, attempt = job.attempts))]
    async fn execute(&self, job: &StoredJob) -> Result<JobOutcome, SearchSyncError> {
        let search_job: SearchJob = match serde_json::from_value(job.payload.clone()) {
            Ok(search_job) => search_job,
            Err(e) => {
                error!(error = %e, payload = %job.payload, "Invalid job payload");
                self.store
                    .mark_failed(job.id, &format!("invalid payload: {}", e))
                    .await?;
                return Ok(JobOutcome::Failed);
            }
        };

        let timeout = Duration::from_secs(job.timeout_secs);
        let result = match tokio::time::timeout(timeout, run_job(&self.ctx, &search_job)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err((e.is_retryable(), e.to_string())),
            Err(_) => Err((true, format!("timed out after {}s", job.timeout_secs))),
        };

        let outcome = match result {
            Ok(()) => {
                self.store.mark_succeeded(job.id).await?;
                info!(kind = search_job.kind(), "Job succeeded");
                JobOutcome::Succeeded
            }
            Err((true, message)) if job.can_retry() => {
                let delay = backoff_delay(job.attempts, job.retry_backoff);
                let run_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                self.store.schedule_retry(job.id, run_at, &message).await?;
                warn!(kind = search_job.kind(), error = %message, retry_in = ?delay, "Job failed, retrying");
                JobOutcome::Retrying { run_at }
            }
            Err((_, message)) => {
                self.store.mark_failed(job.id, &message).await?;
                error!(kind = search_job.kind(), error = %message, "Job failed");
                JobOutcome::Failed
            }
        };
        Ok(outcome)
    }

    /// Run jobs until [`Worker::shutdown`] is called or Ctrl-C is received.
    ///
    /// A job interrupted by Ctrl-C stays claimed and is requeued once its
    /// timeout has passed twice over.
    pub async fn run(&self) -> Result<(), SearchSyncError> {
        info!(queues = ?self.config.queues, "Starting worker");
        let requeued = self.store.requeue_abandoned().await?;
        if requeued > 0 {
            info!(requeued, "Requeued abandoned jobs");
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut progress_timer = interval(self.config.progress_interval);
        progress_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut wait = Duration::ZERO;

        'worker: loop {
            let work = async move {
                sleep(wait).await;
                self.process_next().await
            };
            tokio::pin!(work);

            let result = loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown request");
                        break 'worker;
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received shutdown signal");
                        break 'worker;
                    }
                    _ = progress_timer.tick() => self.log_progress().await,
                    result = &mut work => break result,
                }
            };

            wait = match result {
                Ok(Some(_)) => Duration::ZERO,
                Ok(None) => self.config.poll_interval,
                Err(e) => {
                    error!(error = %e, "Failed to process job");
                    self.config.poll_interval
                }
            };
        }

        info!(
            succeeded = self.stats.succeeded(),
            retried = self.stats.retried(),
            failed = self.stats.failed(),
            "Worker stopped"
        );
        Ok(())
    }

    async fn log_progress(&self) {
        info!(
            succeeded = self.stats.succeeded(),
            retried = self.stats.retried(),
            failed = self.stats.failed(),
            "Worker progress"
        );
        match self.store.requeue_abandoned().await {
            Ok(0) => {}
            Ok(requeued) => info!(requeued, "Requeued abandoned jobs"),
            Err(e) => warn!(error = %e, "Failed to requeue abandoned jobs"),
        }
    }
}
