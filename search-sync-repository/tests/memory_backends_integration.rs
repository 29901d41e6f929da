//! Integration tests running built queries and bulk requests against the
//! in-memory cluster, and the job store lifecycle.

use std::time::Duration;

use chrono::Utc;
use search_sync_repository::memory::{InMemoryJobStore, InMemorySearchProvider};
use search_sync_repository::{
    BulkAction, JobStatus, JobStore, NewJob, SearchIndexProvider, SearchQueryBuilder,
};
use search_sync_shared::{FieldMapping, IndexMapping, SearchQuery};
use serde_json::{json, Map, Value};

const INDEX: &str = "test-company-abc";
const ALIAS: &str = "test-company-read";

fn mapping() -> IndexMapping {
    IndexMapping::new()
        .field("id", FieldMapping::keyword())
        .field("name", FieldMapping::name_text())
        .field("created_on", FieldMapping::date())
        .field(
            "sector",
            FieldMapping::object([("id", FieldMapping::keyword())]),
        )
        .field(
            "contacts",
            FieldMapping::nested([
                ("id", FieldMapping::keyword()),
                ("name", FieldMapping::sortable_text()),
            ]),
        )
}

fn source(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

async fn seeded_provider() -> InMemorySearchProvider {
    let provider = InMemorySearchProvider::new();
    provider
        .create_index(INDEX, &mapping(), &[ALIAS.to_string()])
        .await
        .unwrap();

    let companies = [
        json!({
            "id": "1",
            "name": "Acme Trading",
            "created_on": "2023-01-10",
            "sector": {"id": "s-1"},
            "contacts": [{"id": "c-1", "name": "Jane Smith"}],
        }),
        json!({
            "id": "2",
            "name": "Blue Harbour",
            "created_on": "2024-06-01",
            "sector": null,
            "contacts": [{"id": "c-2", "name": "Omar Khan"}],
        }),
        json!({
            "id": "3",
            "name": "Acme Holdings",
            "created_on": "2024-09-15",
            "sector": {"id": "s-2"},
            "contacts": [],
        }),
    ];
    let actions: Vec<_> = companies
        .into_iter()
        .map(|company| BulkAction::Index {
            index: ALIAS.to_string(),
            id: company["id"].as_str().unwrap().to_string(),
            source: source(company),
        })
        .collect();

    let summary = provider
        .bulk(&actions, Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 3);
    provider
}

async fn ids_for(provider: &InMemorySearchProvider, query: &SearchQuery) -> Vec<String> {
    let mapping = mapping();
    let fields = vec!["name".to_string()];
    let body = SearchQueryBuilder::new(&mapping)
        .with_search_fields(&fields)
        .build(query);

    let hits = provider.search(ALIAS, &body).await.unwrap();
    hits.hits.into_iter().map(|hit| hit.id).collect()
}

#[tokio::test]
async fn test_term_matches_every_word() {
    let provider = seeded_provider().await;

    let ids = ids_for(&provider, &SearchQuery::new("acme").with_ordering("id")).await;
    assert_eq!(ids, vec!["1", "3"]);

    let ids = ids_for(&provider, &SearchQuery::new("acme holdings")).await;
    assert_eq!(ids, vec!["3"]);
}

#[tokio::test]
async fn test_nested_filter_matches_related_objects() {
    let provider = seeded_provider().await;

    let ids = ids_for(
        &provider,
        &SearchQuery::new("").with_filter("contacts.name", "omar"),
    )
    .await;

    assert_eq!(ids, vec!["2"]);
}

#[tokio::test]
async fn test_null_filter_matches_missing_relation() {
    let provider = seeded_provider().await;

    let ids = ids_for(
        &provider,
        &SearchQuery::new("").with_filter("sector.id", Value::Null),
    )
    .await;

    assert_eq!(ids, vec!["2"]);
}

#[tokio::test]
async fn test_date_range_filters() {
    let provider = seeded_provider().await;

    let ids = ids_for(
        &provider,
        &SearchQuery::new("")
            .with_filter("created_on_after", "2024-01-01")
            .with_filter("created_on_before", "2024-07-01"),
    )
    .await;

    assert_eq!(ids, vec!["2"]);
}

#[tokio::test]
async fn test_bulk_reports_missing_targets_per_item() {
    let provider = seeded_provider().await;

    let summary = provider
        .bulk(
            &[
                BulkAction::Delete {
                    index: ALIAS.to_string(),
                    id: "1".to_string(),
                },
                BulkAction::Delete {
                    index: ALIAS.to_string(),
                    id: "404".to_string(),
                },
                BulkAction::Delete {
                    index: "test-company-gone".to_string(),
                    id: "2".to_string(),
                },
            ],
            Duration::from_secs(30),
        )
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 2);
    assert!(summary.failures_ignoring_not_found().is_empty());
    assert_eq!(provider.document_ids(INDEX).len(), 2);
}

fn new_job(queue: &str, max_retries: u32) -> NewJob {
    NewJob {
        queue: queue.to_string(),
        payload: json!({"type": "sync_all_models"}),
        timeout_secs: 60,
        max_retries,
        retry_backoff: false,
        run_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_job_lifecycle_with_retries() {
    let store = InMemoryJobStore::new();
    let queues = vec!["default".to_string()];
    let id = store.enqueue(new_job("default", 1)).await.unwrap();
    store.enqueue(new_job("long-running", 1)).await.unwrap();

    let first = store.claim_next(&queues).await.unwrap().unwrap();
    assert_eq!(first.id, id);
    assert_eq!(first.attempts, 1);
    assert!(first.can_retry());
    assert!(store.claim_next(&queues).await.unwrap().is_none());

    store
        .schedule_retry(id, Utc::now(), "cluster unavailable")
        .await
        .unwrap();
    let second = store.claim_next(&queues).await.unwrap().unwrap();
    assert_eq!(second.attempts, 2);
    assert!(!second.can_retry());

    store.mark_failed(id, "cluster unavailable").await.unwrap();
    let failed = store.jobs_with_status(JobStatus::Failed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].last_error.as_deref(), Some("cluster unavailable"));
    assert_eq!(store.jobs_with_status(JobStatus::Queued).len(), 1);
}
