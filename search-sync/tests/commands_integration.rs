//! Integration tests for the operator commands.

mod common;

use std::io::Cursor;
use std::time::Duration;

use common::{widget_mapping, widget_mapping_v2, widget_rows, Harness, APP};
use search_sync::commands::{
    delete_all_es_indices, migrate_search, sync_search, SyncReport, MIGRATE_LOCK_KEY,
};
use search_sync::migrate::MigrationOutcome;
use search_sync::SearchSyncError;
use search_sync_repository::{AdvisoryLock, SearchIndexProvider};
use tokio::time::timeout;

#[tokio::test]
async fn test_migrate_search_runs_every_app_under_lock() {
    let harness = Harness::new(widget_rows(5));

    let outcomes = migrate_search(&harness.ctx, &[]).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].0, APP);
    assert!(matches!(outcomes[0].1, MigrationOutcome::Initialised { .. }));
    assert!(!harness.locks.is_held(MIGRATE_LOCK_KEY));
}

#[tokio::test]
async fn test_migrate_search_waits_for_running_migration() {
    let harness = Harness::new(widget_rows(5));
    let guard = harness.locks.acquire(MIGRATE_LOCK_KEY).await.unwrap();

    let ctx = harness.ctx.clone();
    let run = tokio::spawn(async move { migrate_search(&ctx, &[]).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!run.is_finished());
    assert!(harness.provider.created_indices().is_empty());

    guard.release().await.unwrap();
    let outcomes = timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcomes.len(), 1);
}

#[tokio::test]
async fn test_migrate_search_rejects_unknown_model_before_locking() {
    let harness = Harness::new(widget_rows(1));
    let _guard = harness.locks.acquire(MIGRATE_LOCK_KEY).await.unwrap();

    let err = timeout(
        Duration::from_secs(5),
        migrate_search(&harness.ctx, &["gadget".to_string()]),
    )
    .await
    .unwrap()
    .unwrap_err();

    assert!(matches!(err, SearchSyncError::UnknownApp(_)));
}

#[tokio::test]
async fn test_sync_search_schedules_jobs() {
    let harness = Harness::new(widget_rows(5));
    migrate_search(&harness.ctx, &[]).await.unwrap();
    harness.drain_jobs().await;

    let all = sync_search(&harness.ctx, &[], false, None).await.unwrap();
    let one = sync_search(&harness.ctx, &[APP.to_string()], false, Some(2))
        .await
        .unwrap();

    assert!(matches!(all, SyncReport::Scheduled(ref ids) if ids.len() == 1));
    assert!(matches!(one, SyncReport::Scheduled(ref ids) if ids.len() == 1));
    let types: Vec<_> = harness
        .jobs
        .jobs()
        .into_iter()
        .skip(1)
        .map(|job| job.payload["type"].clone())
        .collect();
    assert_eq!(types, vec!["sync_all_models", "sync_model"]);
}

#[tokio::test]
async fn test_sync_search_in_foreground() {
    let harness = Harness::new(widget_rows(12));
    harness
        .ctx
        .indices
        .set_up_index_and_aliases(&harness.app())
        .await
        .unwrap();

    let report = sync_search(&harness.ctx, &[], true, Some(5)).await.unwrap();

    match report {
        SyncReport::Synced(summaries) => {
            assert_eq!(summaries.len(), 1);
            assert_eq!(summaries[0].1.objects_synced, 12);
            assert_eq!(summaries[0].1.batches, 3);
        }
        other => panic!("unexpected report: {other:?}"),
    }
    assert!(harness.jobs.jobs().is_empty());
}

#[tokio::test]
async fn test_delete_all_indices_requires_confirmation() {
    let v1 = Harness::new(widget_rows(3));
    migrate_search(&v1.ctx, &[]).await.unwrap();
    let v2 = v1.redeploy(widget_mapping_v2());
    migrate_search(&v2.ctx, &[]).await.unwrap();
    v2.provider
        .create_index("unrelated", &widget_mapping(), &[])
        .await
        .unwrap();

    let mut output = Vec::new();
    let deleted = delete_all_es_indices(&v2.ctx, false, &mut Cursor::new("no\n"), &mut output)
        .await
        .unwrap();
    assert!(deleted.is_empty());
    let prompt = String::from_utf8(output).unwrap();
    assert!(prompt.contains(&v2.index_for(&widget_mapping())));
    assert!(prompt.contains(&v2.index_for(&widget_mapping_v2())));
    assert!(prompt.contains("Cancelled."));
    assert_eq!(v2.provider.index_names().len(), 3);

    let mut output = Vec::new();
    let deleted = delete_all_es_indices(&v2.ctx, false, &mut Cursor::new("yes\n"), &mut output)
        .await
        .unwrap();
    assert_eq!(deleted.len(), 2);
    assert_eq!(
        v2.provider.index_names().into_iter().collect::<Vec<_>>(),
        vec!["unrelated".to_string()]
    );
    assert!(!v2.provider.alias_exists(&v2.read_alias()).await.unwrap());
}

#[tokio::test]
async fn test_delete_all_indices_without_input() {
    let harness = Harness::new(widget_rows(3));
    migrate_search(&harness.ctx, &[]).await.unwrap();

    let mut output = Vec::new();
    let deleted = delete_all_es_indices(&harness.ctx, true, &mut Cursor::new(""), &mut output)
        .await
        .unwrap();

    assert_eq!(deleted, vec![harness.index_for(&widget_mapping())]);
    assert!(harness.provider.index_names().is_empty());
}
