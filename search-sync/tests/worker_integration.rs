//! Integration tests for job scheduling and the worker.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{widget_mapping, widget_mapping_v2, widget_rows, Harness, APP};
use search_sync::migrate::migrate_app;
use search_sync::tasks::{JobOptions, JobOutcome, JobScheduler, SearchJob, Worker, WorkerConfig};
use search_sync_repository::{JobStatus, JobStore, NewJob, SearchIndexProvider};
use serde_json::json;
use tokio::time::{sleep, timeout};

async fn initialised_harness(rows: u128) -> Harness {
    let harness = Harness::new(widget_rows(rows));
    harness
        .ctx
        .indices
        .set_up_index_and_aliases(&harness.app())
        .await
        .unwrap();
    harness
}

#[tokio::test]
async fn test_sync_all_models_fans_out() {
    let harness = initialised_harness(40).await;
    harness
        .ctx
        .scheduler
        .schedule_default(SearchJob::SyncAllModels { batch_size: Some(15) })
        .await
        .unwrap();

    let attempts = harness.drain_jobs().await;

    assert_eq!(attempts, 2);
    let jobs = harness.jobs.jobs_with_status(JobStatus::Succeeded);
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[1].payload, json!({"type": "sync_model", "app": APP, "batch_size": 15}));
    assert_eq!(harness.source.fetch_sizes(), vec![15, 15, 10]);
    assert_eq!(
        harness
            .provider
            .document_ids(&harness.index_for(&widget_mapping()))
            .len(),
        40
    );
}

#[tokio::test]
async fn test_retryable_failure_is_retried_then_failed() {
    let v1 = initialised_harness(5).await;
    let v2 = v1.redeploy(widget_mapping_v2());
    migrate_app(&v2.ctx, &v2.app()).await.unwrap();
    // Replace the legitimate completion job with one for a mapping that
    // never becomes current.
    for job in v2.jobs.jobs() {
        v2.jobs.mark_succeeded(job.id).await.unwrap();
    }
    let id = v2
        .ctx
        .scheduler
        .schedule_default(SearchJob::CompleteModelMigration {
            app: APP.to_string(),
            new_mapping_hash: "0".repeat(32),
        })
        .await
        .unwrap();

    let worker = v2.worker();
    let before = Utc::now();
    for attempt in 1..=3 {
        let (job_id, outcome) = worker.process_next().await.unwrap().unwrap();
        assert_eq!(job_id, id);
        match outcome {
            JobOutcome::Retrying { run_at } => assert!(run_at >= before),
            other => panic!("attempt {attempt}: unexpected outcome {other:?}"),
        }
        let record = &v2.jobs.jobs_with_status(JobStatus::Queued)[0];
        assert_eq!(record.attempts, attempt);
        assert!(record.last_error.as_deref().unwrap().contains("Stale migration target"));
        v2.jobs.make_all_due();
    }

    let (_, outcome) = worker.process_next().await.unwrap().unwrap();
    assert_eq!(outcome, JobOutcome::Failed);

    let failed = v2.jobs.jobs_with_status(JobStatus::Failed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, 4);
    assert_eq!(worker.stats().retried(), 3);
    assert_eq!(worker.stats().failed(), 1);
    let read = v2.provider.get_indices_for_alias(&v2.read_alias()).await.unwrap();
    assert_eq!(read.len(), 2);
}

#[tokio::test]
async fn test_fatal_failure_is_not_retried() {
    let harness = initialised_harness(1).await;
    harness
        .ctx
        .scheduler
        .schedule_default(SearchJob::SyncModel {
            app: "gadget".to_string(),
            batch_size: None,
        })
        .await
        .unwrap();

    let worker = harness.worker();
    let (_, outcome) = worker.process_next().await.unwrap().unwrap();

    assert_eq!(outcome, JobOutcome::Failed);
    let failed = harness.jobs.jobs_with_status(JobStatus::Failed);
    assert_eq!(failed[0].attempts, 1);
    assert!(failed[0].last_error.as_deref().unwrap().contains("gadget"));
}

#[tokio::test]
async fn test_invalid_payload_fails_job() {
    let harness = initialised_harness(1).await;
    harness
        .jobs
        .enqueue(NewJob {
            queue: "default".to_string(),
            payload: json!({"type": "reindex_everything"}),
            timeout_secs: 60,
            max_retries: 3,
            retry_backoff: true,
            run_at: Utc::now(),
        })
        .await
        .unwrap();

    let (_, outcome) = harness.worker().process_next().await.unwrap().unwrap();

    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(harness.jobs.jobs_with_status(JobStatus::Failed).len(), 1);
}

#[tokio::test]
async fn test_worker_only_claims_its_queues() {
    let harness = initialised_harness(3).await;
    harness
        .ctx
        .scheduler
        .schedule_default(SearchJob::SyncModel {
            app: APP.to_string(),
            batch_size: None,
        })
        .await
        .unwrap();

    let default_only = Worker::new(
        harness.ctx.clone(),
        harness.jobs.clone(),
        WorkerConfig {
            queues: vec!["default".to_string()],
            ..WorkerConfig::default()
        },
    );
    assert_eq!(default_only.run_until_idle().await.unwrap(), 0);
    assert_eq!(harness.drain_jobs().await, 1);
}

#[tokio::test]
async fn test_delayed_job_waits() {
    let harness = initialised_harness(3).await;
    harness
        .ctx
        .scheduler
        .schedule(
            SearchJob::SyncModel {
                app: APP.to_string(),
                batch_size: None,
            },
            JobOptions {
                delay: Duration::from_secs(3600),
                ..JobOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(harness.drain_jobs().await, 0);
    harness.jobs.make_all_due();
    assert_eq!(harness.drain_jobs().await, 1);
}

#[tokio::test]
async fn test_run_loop_processes_jobs_until_shutdown() {
    let harness = initialised_harness(12).await;
    harness
        .ctx
        .scheduler
        .schedule_default(SearchJob::SyncModel {
            app: APP.to_string(),
            batch_size: Some(5),
        })
        .await
        .unwrap();

    let worker = Arc::new(Worker::new(
        harness.ctx.clone(),
        harness.jobs.clone(),
        WorkerConfig {
            poll_interval: Duration::from_millis(10),
            ..WorkerConfig::default()
        },
    ));
    let handle = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    timeout(Duration::from_secs(5), async {
        while worker.stats().succeeded() < 1 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    worker.shutdown();
    timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(
        harness
            .provider
            .document_ids(&harness.index_for(&widget_mapping()))
            .len(),
        12
    );
}
