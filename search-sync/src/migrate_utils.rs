//! Resync and clean-up after the write alias has moved to a new index.

use std::collections::BTreeSet;

use async_trait::async_trait;
use search_sync_repository::{BulkAction, SearchIndexError};
use tracing::{info, instrument, warn};

use crate::apps::SearchApp;
use crate::bulk_sync::{execute_bulk, sync_app, PostBatchCallback};
use crate::context::SearchContext;
use crate::errors::SearchSyncError;

/// Removes each synced batch from the read indices other than the write
/// index.
///
/// While a migration is in progress the read alias spans the old and the new
/// index, so every resynced document would otherwise be returned twice.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteFromSecondaryIndices;

#[async_trait]
impl PostBatchCallback for DeleteFromSecondaryIndices {
    async fn after_batch(
        &self,
        ctx: &SearchContext,
        read_indices: &BTreeSet<String>,
        write_index: &str,
        actions: &[BulkAction],
    ) -> Result<(), SearchSyncError> {
        for index in read_indices.iter().filter(|index| *index != write_index) {
            let deletes: Vec<BulkAction> = actions
                .iter()
                .map(|action| BulkAction::Delete {
                    index: index.clone(),
                    id: action.id().to_string(),
                })
                .collect();
            execute_bulk(ctx.provider().as_ref(), &deletes, index, true).await?;
        }
        Ok(())
    }
}

/// Resync an app whose read alias spans several indices, then drop every
/// index but the write index from the read alias and delete the indices no
/// alias references any more.
#[instrument(skip(ctx, app), fields(app = %app.name))]
pub async fn resync_after_migrate(ctx: &SearchContext, app: &SearchApp) -> Result<(), SearchSyncError> {
    let (read_indices, _) = ctx.indices.get_read_and_write_indices(app).await?;
    if read_indices.len() == 1 {
        info!("Read alias has a single index, nothing to do");
        return Ok(());
    }

    let summary = sync_app(ctx, app, None, Some(&DeleteFromSecondaryIndices)).await?;
    info!(rows_processed = summary.rows_processed, "Resynced after migration");

    // The aliases may have changed during the sync.
    let (read_indices, write_index) = ctx.indices.get_read_and_write_indices(app).await?;
    let old_indices: Vec<String> = read_indices
        .into_iter()
        .filter(|index| *index != write_index)
        .collect();

    let read_alias = ctx.naming().read_alias(&app.name);
    let mut transaction = ctx.indices.start_alias_transaction();
    transaction.dissociate_indices_from_alias(&read_alias, old_indices.iter().cloned());
    transaction.commit().await?;
    info!(removed = ?old_indices, write_index = %write_index, "Removed old indices from read alias");

    for index in &old_indices {
        match ctx.indices.get_aliases_for_index(index).await {
            Ok(aliases) if aliases.is_empty() => match ctx.indices.delete_index(index).await {
                Ok(()) | Err(SearchSyncError::SearchIndex(SearchIndexError::IndexNotFound(_))) => {}
                Err(e) => return Err(e),
            },
            Ok(aliases) => {
                warn!(index = %index, aliases = ?aliases, "Old index is still referenced, not deleting it");
            }
            Err(SearchSyncError::SearchIndex(SearchIndexError::IndexNotFound(_))) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}
