//! Bulk resynchronisation of an app's rows into its write index.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use search_sync_repository::{BatchOperationSummary, BulkAction, SearchIndexProvider};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::apps::SearchApp;
use crate::context::SearchContext;
use crate::errors::SearchSyncError;
use crate::mapper::{db_objects_to_documents, index_actions};

/// Timeout of one bulk request.
pub const BULK_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Rows between two progress log lines.
const PROGRESS_LOG_INTERVAL: u64 = 20_000;

/// Counts reported by [`sync_app`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncSummary {
    /// Primary keys read from the source.
    pub rows_processed: u64,
    /// Documents written. Lower than `rows_processed` when rows were deleted
    /// while the sync ran.
    pub objects_synced: u64,
    /// Bulk requests sent.
    pub batches: u64,
}

/// Hook run after each batch has been written.
#[async_trait]
pub trait PostBatchCallback: Send + Sync {
    async fn after_batch(
        &self,
        ctx: &SearchContext,
        read_indices: &BTreeSet<String>,
        write_index: &str,
        actions: &[BulkAction],
    ) -> Result<(), SearchSyncError>;
}

/// Sync every row of `app` into its current write index.
///
/// Primary keys are streamed from the source (most recently modified first
/// when the source supports it) and processed in batches of `batch_size`,
/// defaulting to the app's `bulk_batch_size`. Each batch is fetched, mapped
/// and upserted by id in one bulk request, so running a sync twice leaves
/// the index unchanged. Rows deleted between listing and fetching are
/// skipped.
///
/// # Errors
///
/// Fails with [`SearchSyncError::Consistency`] before writing anything if
/// the app's aliases are inconsistent, and with
/// [`SearchSyncError::BulkItemsFailed`] if any item of a batch is rejected.
#[instrument(skip(ctx, app, callback), fields(app = %app.name))]
pub async fn sync_app(
    ctx: &SearchContext,
    app: &SearchApp,
    batch_size: Option<usize>,
    callback: Option<&dyn PostBatchCallback>,
) -> Result<SyncSummary, SearchSyncError> {
    let (read_indices, write_index) = ctx.indices.get_read_and_write_indices(app).await?;
    let batch_size = batch_size.unwrap_or(app.bulk_batch_size).max(1);

    let total = match app.source.count().await {
        Ok(total) => Some(total),
        Err(e) => {
            warn!(error = %e, "Could not count rows, progress will not show a total");
            None
        }
    };
    info!(write_index = %write_index, batch_size, total_rows = ?total, "Starting sync");

    let mut keys = app.source.primary_keys().await?;
    let mut summary = SyncSummary::default();
    let mut batch: Vec<Uuid> = Vec::with_capacity(batch_size);

    loop {
        let next = keys.try_next().await?;
        if let Some(id) = next {
            batch.push(id);
            if batch.len() < batch_size {
                continue;
            }
        } else if batch.is_empty() {
            break;
        }

        let ids = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
        let actions = sync_batch(ctx, app, &ids, &write_index).await?;

        let previous = summary.rows_processed;
        summary.rows_processed += ids.len() as u64;
        summary.objects_synced += actions.len() as u64;
        summary.batches += 1;

        if let Some(callback) = callback {
            callback
                .after_batch(ctx, &read_indices, &write_index, &actions)
                .await?;
        }

        if summary.rows_processed / PROGRESS_LOG_INTERVAL > previous / PROGRESS_LOG_INTERVAL {
            info!(
                rows_processed = summary.rows_processed,
                objects_synced = summary.objects_synced,
                total_rows = ?total,
                "Sync progress"
            );
        }

        if next.is_none() {
            break;
        }
    }

    info!(
        rows_processed = summary.rows_processed,
        objects_synced = summary.objects_synced,
        batches = summary.batches,
        "Sync complete"
    );
    if summary.rows_processed != summary.objects_synced {
        warn!(
            rows_processed = summary.rows_processed,
            objects_synced = summary.objects_synced,
            "Not all rows were synced, some were probably deleted during the sync"
        );
    }

    Ok(summary)
}

/// Fetch, map and upsert one batch of rows. Returns the actions sent.
async fn sync_batch(
    ctx: &SearchContext,
    app: &SearchApp,
    ids: &[Uuid],
    write_index: &str,
) -> Result<Vec<BulkAction>, SearchSyncError> {
    let rows = app.source.fetch_rows(ids).await?;
    let documents = db_objects_to_documents(app, &rows);
    let actions = index_actions(write_index, documents);

    execute_bulk(ctx.provider().as_ref(), &actions, write_index, false).await?;
    debug!(requested = ids.len(), indexed = actions.len(), "Synced batch");
    Ok(actions)
}

/// Send a bulk request and turn rejected items into an error.
///
/// With `ignore_not_found`, items that failed only because the document or
/// index did not exist are not counted as failures.
pub async fn execute_bulk(
    provider: &dyn SearchIndexProvider,
    actions: &[BulkAction],
    target: &str,
    ignore_not_found: bool,
) -> Result<BatchOperationSummary, SearchSyncError> {
    if actions.is_empty() {
        return Ok(BatchOperationSummary::default());
    }

    let summary = provider.bulk(actions, BULK_REQUEST_TIMEOUT).await?;
    let failures: Vec<_> = if ignore_not_found {
        summary.failures_ignoring_not_found()
    } else {
        summary.results.iter().filter(|r| !r.success).collect()
    };

    if let Some(first) = failures.first() {
        warn!(
            index = target,
            failed = failures.len(),
            first_id = %first.id,
            first_status = first.status,
            "Bulk request had failed items"
        );
        return Err(SearchSyncError::BulkItemsFailed {
            index: target.to_string(),
            failed: failures.len(),
            first_error: first
                .error
                .clone()
                .unwrap_or_else(|| format!("status {}", first.status)),
        });
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_sync_repository::memory::InMemorySearchProvider;
    use search_sync_shared::IndexMapping;
    use serde_json::Map;

    fn upsert(index: &str, id: &str) -> BulkAction {
        BulkAction::Index {
            index: index.to_string(),
            id: id.to_string(),
            source: Map::new(),
        }
    }

    fn delete(index: &str, id: &str) -> BulkAction {
        BulkAction::Delete {
            index: index.to_string(),
            id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_execute_bulk_skips_empty_requests() {
        let provider = InMemorySearchProvider::new();
        let summary = execute_bulk(&provider, &[], "idx", false).await.unwrap();
        assert_eq!(summary.total, 0);
        assert!(provider.bulk_requests().is_empty());
    }

    #[tokio::test]
    async fn test_execute_bulk_fails_on_rejected_items() {
        let provider = InMemorySearchProvider::new();
        provider
            .create_index("idx", &IndexMapping::new(), &[])
            .await
            .unwrap();
        provider.fail_document("bad");

        let err = execute_bulk(&provider, &[upsert("idx", "ok"), upsert("idx", "bad")], "idx", false)
            .await
            .unwrap_err();
        match err {
            SearchSyncError::BulkItemsFailed { index, failed, .. } => {
                assert_eq!(index, "idx");
                assert_eq!(failed, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_execute_bulk_can_ignore_missing_documents() {
        let provider = InMemorySearchProvider::new();
        provider
            .create_index("idx", &IndexMapping::new(), &[])
            .await
            .unwrap();

        let actions = [delete("idx", "never-indexed")];
        let summary = execute_bulk(&provider, &actions, "idx", true).await.unwrap();
        assert_eq!(summary.failed, 1);

        assert!(execute_bulk(&provider, &actions, "idx", false).await.is_err());
    }
}
