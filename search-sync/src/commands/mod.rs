//! Operator commands run by the CLI.

use std::io::{BufRead, Write};

use tracing::{info, instrument, warn};

use crate::bulk_sync::{sync_app, SyncSummary};
use crate::context::SearchContext;
use crate::errors::SearchSyncError;
use crate::migrate::{migrate_apps, MigrationOutcome};
use crate::tasks::SearchJob;

/// Lock held while migrations run, so two deployments never migrate at once.
pub const MIGRATE_LOCK_KEY: &str = "search-migrate";

/// Migrate the named apps (every app when `models` is empty), holding
/// [`MIGRATE_LOCK_KEY`] for the whole run.
#[instrument(skip(ctx))]
pub async fn migrate_search(
    ctx: &SearchContext,
    models: &[String],
) -> Result<Vec<(String, MigrationOutcome)>, SearchSyncError> {
    // Fail on unknown names before waiting for the lock.
    ctx.registry.select(models)?;

    info!(lock = MIGRATE_LOCK_KEY, "Waiting for migration lock");
    let guard = ctx.locks.acquire(MIGRATE_LOCK_KEY).await?;
    let result = migrate_apps(ctx, models).await;
    if let Err(e) = guard.release().await {
        warn!(lock = MIGRATE_LOCK_KEY, error = %e, "Failed to release lock");
    }

    let outcomes = result?;
    for (app, outcome) in &outcomes {
        info!(app = %app, outcome = ?outcome, "Migrated app");
    }
    Ok(outcomes)
}

/// What [`sync_search`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncReport {
    /// Jobs were scheduled, with these ids.
    Scheduled(Vec<i64>),
    /// The apps were synced in this process.
    Synced(Vec<(String, SyncSummary)>),
}

/// Resync the named apps (every app when `models` is empty).
///
/// By default the work is scheduled as background jobs; with `foreground`
/// each app is synced in this process, one after the other.
#[instrument(skip(ctx))]
pub async fn sync_search(
    ctx: &SearchContext,
    models: &[String],
    foreground: bool,
    batch_size: Option<usize>,
) -> Result<SyncReport, SearchSyncError> {
    let apps = ctx.registry.select(models)?;

    if foreground {
        let mut summaries = Vec::with_capacity(apps.len());
        for app in apps {
            let summary = sync_app(ctx, &app, batch_size, None).await?;
            summaries.push((app.name.clone(), summary));
        }
        return Ok(SyncReport::Synced(summaries));
    }

    let jobs = if models.is_empty() {
        vec![SearchJob::SyncAllModels { batch_size }]
    } else {
        apps.iter()
            .map(|app| SearchJob::SyncModel {
                app: app.name.clone(),
                batch_size,
            })
            .collect()
    };

    let mut ids = Vec::with_capacity(jobs.len());
    for job in jobs {
        ids.push(ctx.scheduler.schedule_default(job).await?);
    }
    info!(jobs = ids.len(), "Scheduled sync jobs");
    Ok(SyncReport::Scheduled(ids))
}

/// Delete every index under the configured prefix.
///
/// Unless `noinput` is set, lists the indices on `output` and only proceeds
/// if the line read from `input` is exactly `yes`. Returns the deleted
/// indices, empty when the operator declined.
pub async fn delete_all_es_indices(
    ctx: &SearchContext,
    noinput: bool,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<Vec<String>, SearchSyncError> {
    if !noinput {
        let pattern = ctx.naming().index_pattern();
        let indices = ctx.provider().list_indices(&pattern).await?;
        if indices.is_empty() {
            writeln!(output, "No indices match {}.", pattern).map_err(io_error)?;
            return Ok(Vec::new());
        }

        writeln!(output, "The following indices will be deleted:").map_err(io_error)?;
        for index in &indices {
            writeln!(output, "  {}", index).map_err(io_error)?;
        }
        write!(output, "Type 'yes' to continue, or anything else to cancel: ").map_err(io_error)?;
        output.flush().map_err(io_error)?;

        let mut answer = String::new();
        input.read_line(&mut answer).map_err(io_error)?;
        if answer.trim() != "yes" {
            writeln!(output, "Cancelled.").map_err(io_error)?;
            return Ok(Vec::new());
        }
    }

    let deleted = ctx.indices.delete_all_indices().await?;
    writeln!(output, "Deleted {} indices.", deleted.len()).map_err(io_error)?;
    Ok(deleted)
}

fn io_error(e: std::io::Error) -> SearchSyncError {
    SearchSyncError::config(format!("console I/O failed: {}", e))
}
