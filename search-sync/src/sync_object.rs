//! Syncing individual rows after they change.

use search_sync_shared::SourceRow;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::apps::SearchApp;
use crate::bulk_sync::execute_bulk;
use crate::context::SearchContext;
use crate::errors::SearchSyncError;
use crate::mapper::{db_objects_to_documents, index_actions};

/// Sync one row of `app` into its write alias.
///
/// Returns `false` when the row no longer exists in the source.
pub async fn sync_object(
    ctx: &SearchContext,
    app: &SearchApp,
    pk: Uuid,
) -> Result<bool, SearchSyncError> {
    let Some(row) = app.source.fetch_row(pk).await? else {
        debug!(app = %app.name, id = %pk, "Row is gone, nothing to sync");
        return Ok(false);
    };
    upsert(ctx, app, &[row]).await?;
    Ok(true)
}

/// Sync the given rows of `app` into its write alias and return how many
/// were written. Rows missing from the source are skipped.
#[instrument(skip(ctx, app, ids), fields(app = %app.name, requested = ids.len()))]
pub async fn sync_objects(
    ctx: &SearchContext,
    app: &SearchApp,
    ids: &[Uuid],
) -> Result<u64, SearchSyncError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let rows = app.source.fetch_rows(ids).await?;
    upsert(ctx, app, &rows).await
}

async fn upsert(ctx: &SearchContext, app: &SearchApp, rows: &[SourceRow]) -> Result<u64, SearchSyncError> {
    let write_alias = ctx.naming().write_alias(&app.name);
    let actions = index_actions(&write_alias, db_objects_to_documents(app, rows));
    execute_bulk(ctx.provider().as_ref(), &actions, &write_alias, false).await?;
    Ok(actions.len() as u64)
}
