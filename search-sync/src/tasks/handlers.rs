//! Execution of background jobs.

use tracing::{info, instrument};

use super::jobs::SearchJob;
use crate::bulk_sync::sync_app;
use crate::context::SearchContext;
use crate::errors::SearchSyncError;
use crate::migrate::complete_model_migration;
use crate::sync_object::sync_objects;

/// Run one job to completion.
#[instrument(skip_all, fields(kind = job.kind()))]
pub async fn run_job(ctx: &SearchContext, job: &SearchJob) -> Result<(), SearchSyncError> {
    match job {
        SearchJob::SyncAllModels { batch_size } => {
            for app in ctx.registry.names() {
                ctx.scheduler
                    .schedule_default(SearchJob::SyncModel {
                        app,
                        batch_size: *batch_size,
                    })
                    .await?;
            }
        }
        SearchJob::SyncModel { app, batch_size } => {
            let app = ctx.app(app)?;
            let summary = sync_app(ctx, &app, *batch_size, None).await?;
            info!(app = %app.name, objects_synced = summary.objects_synced, "Synced app");
        }
        SearchJob::SyncObjects { app, ids } => {
            let app = ctx.app(app)?;
            let synced = sync_objects(ctx, &app, ids).await?;
            info!(app = %app.name, requested = ids.len(), synced, "Synced objects");
        }
        SearchJob::CompleteModelMigration {
            app,
            new_mapping_hash,
        } => complete_model_migration(ctx, app, new_mapping_hash).await?,
    }
    Ok(())
}
