//! Integration tests for the PostgreSQL job store.
//!
//! These tests require a real PostgreSQL database and use SQLx test macros
//! to ensure proper test isolation and cleanup.
//!
//! Run with: `cargo test --test postgres_job_store`

use chrono::{Duration, Utc};
use search_sync_repository::postgres::PostgresJobStore;
use search_sync_repository::{JobStore, JobStoreError, NewJob};
use serde_json::json;

fn make_job(queue: &str) -> NewJob {
    NewJob {
        queue: queue.to_string(),
        payload: json!({"type": "sync_model", "app": "company", "batch_size": null}),
        timeout_secs: 60,
        max_retries: 3,
        retry_backoff: true,
        run_at: Utc::now() - Duration::seconds(1),
    }
}

fn queues(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

async fn job_state(pool: &sqlx::PgPool, id: i64) -> (String, i32, Option<String>) {
    sqlx::query_as("SELECT status, attempts, last_error FROM search_jobs WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Push a running job's claim far enough back to count as abandoned.
async fn backdate_claim(pool: &sqlx::PgPool, id: i64) {
    sqlx::query("UPDATE search_jobs SET claimed_at = now() - interval '1 hour' WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

// ============================================================================
// Claiming
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
async fn test_enqueue_claim_and_succeed(pool: sqlx::PgPool) {
    let store = PostgresJobStore::new(pool.clone());
    let job = make_job("default");
    let id = store.enqueue(job.clone()).await.unwrap();

    let claimed = store.claim_next(&queues(&["default"])).await.unwrap().unwrap();
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.queue, "default");
    assert_eq!(claimed.payload, job.payload);
    assert_eq!(claimed.timeout_secs, 60);
    assert_eq!(claimed.max_retries, 3);
    assert!(claimed.retry_backoff);
    assert_eq!(claimed.attempts, 1);
    assert_eq!(job_state(&pool, id).await.0, "running");

    assert!(store.claim_next(&queues(&["default"])).await.unwrap().is_none());

    store.mark_succeeded(id).await.unwrap();
    assert_eq!(job_state(&pool, id).await.0, "succeeded");
}

#[sqlx::test(migrations = "./migrations")]
async fn test_claims_only_due_jobs_on_requested_queues(pool: sqlx::PgPool) {
    let store = PostgresJobStore::new(pool.clone());
    let later = store
        .enqueue(NewJob {
            run_at: Utc::now() + Duration::hours(1),
            ..make_job("default")
        })
        .await
        .unwrap();
    let other_queue = store.enqueue(make_job("long-running")).await.unwrap();
    let due = store.enqueue(make_job("default")).await.unwrap();

    let claimed = store.claim_next(&queues(&["default"])).await.unwrap().unwrap();
    assert_eq!(claimed.id, due);
    assert!(store.claim_next(&queues(&["default"])).await.unwrap().is_none());

    let claimed = store
        .claim_next(&queues(&["default", "long-running"]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, other_queue);
    assert_eq!(job_state(&pool, later).await.0, "queued");
}

#[sqlx::test(migrations = "./migrations")]
async fn test_claim_skips_rows_locked_by_another_worker(pool: sqlx::PgPool) {
    let store = PostgresJobStore::new(pool.clone());
    let first = store.enqueue(make_job("default")).await.unwrap();
    let second = store.enqueue(make_job("default")).await.unwrap();

    // Another worker is in the middle of claiming the first job.
    let mut other_worker = pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM search_jobs WHERE id = $1 FOR UPDATE")
        .bind(first)
        .execute(&mut *other_worker)
        .await
        .unwrap();

    let claimed = store.claim_next(&queues(&["default"])).await.unwrap().unwrap();
    assert_eq!(claimed.id, second);

    other_worker.rollback().await.unwrap();
    let claimed = store.claim_next(&queues(&["default"])).await.unwrap().unwrap();
    assert_eq!(claimed.id, first);
}

// ============================================================================
// Retries and failures
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
async fn test_retry_then_fail(pool: sqlx::PgPool) {
    let store = PostgresJobStore::new(pool.clone());
    let id = store.enqueue(make_job("default")).await.unwrap();
    store.claim_next(&queues(&["default"])).await.unwrap().unwrap();

    store
        .schedule_retry(id, Utc::now() + Duration::minutes(5), "cluster unavailable")
        .await
        .unwrap();
    let (status, attempts, last_error) = job_state(&pool, id).await;
    assert_eq!(status, "queued");
    assert_eq!(attempts, 1);
    assert_eq!(last_error.as_deref(), Some("cluster unavailable"));
    assert!(store.claim_next(&queues(&["default"])).await.unwrap().is_none());

    sqlx::query("UPDATE search_jobs SET run_at = now() WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();
    let claimed = store.claim_next(&queues(&["default"])).await.unwrap().unwrap();
    assert_eq!(claimed.attempts, 2);

    store.mark_failed(id, "unknown search app").await.unwrap();
    let (status, _, last_error) = job_state(&pool, id).await;
    assert_eq!(status, "failed");
    assert_eq!(last_error.as_deref(), Some("unknown search app"));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_unknown_job_is_not_found(pool: sqlx::PgPool) {
    let store = PostgresJobStore::new(pool);

    let result = store.mark_succeeded(4242).await;

    assert!(matches!(result, Err(JobStoreError::NotFound(4242))));
}

// ============================================================================
// Abandoned jobs
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
async fn test_abandoned_job_is_requeued(pool: sqlx::PgPool) {
    let store = PostgresJobStore::new(pool.clone());
    let id = store.enqueue(make_job("default")).await.unwrap();
    let fresh = store.enqueue(make_job("default")).await.unwrap();
    store.claim_next(&queues(&["default"])).await.unwrap().unwrap();
    store.claim_next(&queues(&["default"])).await.unwrap().unwrap();
    backdate_claim(&pool, id).await;

    assert_eq!(store.requeue_abandoned().await.unwrap(), 1);

    assert_eq!(job_state(&pool, id).await.0, "queued");
    assert_eq!(job_state(&pool, fresh).await.0, "running");
    let claimed = store.claim_next(&queues(&["default"])).await.unwrap().unwrap();
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.attempts, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_abandoned_job_without_retries_left_fails(pool: sqlx::PgPool) {
    let store = PostgresJobStore::new(pool.clone());
    let id = store
        .enqueue(NewJob {
            max_retries: 0,
            ..make_job("default")
        })
        .await
        .unwrap();
    store.claim_next(&queues(&["default"])).await.unwrap().unwrap();
    backdate_claim(&pool, id).await;

    assert_eq!(store.requeue_abandoned().await.unwrap(), 0);

    let (status, attempts, last_error) = job_state(&pool, id).await;
    assert_eq!(status, "failed");
    assert_eq!(attempts, 1);
    assert!(last_error.unwrap().contains("abandoned"));
    assert!(store.claim_next(&queues(&["default"])).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_migrations_are_idempotent(pool: sqlx::PgPool) {
    let store = PostgresJobStore::new(pool);

    store.run_migrations().await.unwrap();
    store.run_migrations().await.unwrap();
}
