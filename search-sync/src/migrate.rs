//! Zero-downtime migration of apps to changed mappings.
//!
//! A migration creates an index for the new mapping, adds it to the read
//! alias and moves the write alias onto it in one atomic alias update. Reads
//! keep hitting the old index (and the new one) while a background job
//! resyncs every row into the new index and then retires the old ones.

use std::fmt;

use tracing::{info, instrument, warn};

use crate::apps::SearchApp;
use crate::context::SearchContext;
use crate::errors::SearchSyncError;
use crate::indices::IndexNaming;
use crate::migrate_utils::resync_after_migrate;
use crate::tasks::SearchJob;

/// Where an app stands relative to its current mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// The app has no aliases yet.
    Uninitialised,
    /// The write index has the current mapping and is the only read index.
    UpToDate,
    /// The write index has an outdated mapping.
    NeedsMigration,
    /// The write index is current but older indices are still being read.
    MigrationInProgress,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Uninitialised => "uninitialised",
            Self::UpToDate => "up-to-date",
            Self::NeedsMigration => "needs-migration",
            Self::MigrationInProgress => "migration-in-progress",
        };
        f.write_str(state)
    }
}

/// What [`migrate_app`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The first index and both aliases were created and a full sync scheduled.
    Initialised { index: String },
    /// Nothing to do.
    UpToDate,
    /// A new index was created and made the write index.
    Started { old_index: String, new_index: String },
    /// An unfinished migration's completion job was scheduled again.
    Resumed { write_index: String },
}

/// Work out the migration state of an app.
///
/// A changed mapping takes precedence over an unfinished migration, so a
/// second mapping change during a migration starts another cut-over.
pub async fn compute_migration_state(
    ctx: &SearchContext,
    app: &SearchApp,
) -> Result<MigrationState, SearchSyncError> {
    let naming = ctx.naming();
    let provider = ctx.provider();
    let has_read = provider.alias_exists(&naming.read_alias(&app.name)).await?;
    let has_write = provider.alias_exists(&naming.write_alias(&app.name)).await?;
    if !has_read || !has_write {
        return Ok(MigrationState::Uninitialised);
    }

    let (read_indices, write_index) = ctx.indices.get_read_and_write_indices(app).await?;
    let target_hash = ctx.indices.get_target_mapping_hash(app);

    let state = if IndexNaming::hash_from_index_name(&write_index) != Some(target_hash.as_str()) {
        MigrationState::NeedsMigration
    } else if read_indices.len() > 1 {
        MigrationState::MigrationInProgress
    } else {
        MigrationState::UpToDate
    };
    Ok(state)
}

/// Bring one app's indices in line with its mapping.
#[instrument(skip(ctx, app), fields(app = %app.name))]
pub async fn migrate_app(
    ctx: &SearchContext,
    app: &SearchApp,
) -> Result<MigrationOutcome, SearchSyncError> {
    let state = compute_migration_state(ctx, app).await?;
    info!(%state, "Computed migration state");

    match state {
        MigrationState::Uninitialised => {
            ctx.indices.set_up_index_and_aliases(app).await?;
            ctx.scheduler
                .schedule_default(SearchJob::SyncModel {
                    app: app.name.clone(),
                    batch_size: None,
                })
                .await?;
            Ok(MigrationOutcome::Initialised {
                index: ctx.indices.target_index_name(app),
            })
        }
        MigrationState::UpToDate => Ok(MigrationOutcome::UpToDate),
        MigrationState::NeedsMigration => perform_migration(ctx, app).await,
        MigrationState::MigrationInProgress => {
            let (_, write_index) = ctx.indices.get_read_and_write_indices(app).await?;
            schedule_completion(ctx, app).await?;
            info!(write_index = %write_index, "Resumed unfinished migration");
            Ok(MigrationOutcome::Resumed { write_index })
        }
    }
}

/// Migrate the named apps, or every app when `names` is empty.
pub async fn migrate_apps(
    ctx: &SearchContext,
    names: &[String],
) -> Result<Vec<(String, MigrationOutcome)>, SearchSyncError> {
    let apps = ctx.registry.select(names)?;
    let mut outcomes = Vec::with_capacity(apps.len());
    for app in apps {
        let outcome = migrate_app(ctx, &app).await?;
        outcomes.push((app.name.clone(), outcome));
    }
    Ok(outcomes)
}

/// Create the index for the app's current mapping, cut the write alias over
/// to it and schedule the completion job.
pub async fn perform_migration(
    ctx: &SearchContext,
    app: &SearchApp,
) -> Result<MigrationOutcome, SearchSyncError> {
    let (_, old_index) = ctx.indices.get_read_and_write_indices(app).await?;
    let new_index = ctx.indices.target_index_name(app);

    ctx.indices.create_index(&new_index, &app.mapping, &[]).await?;

    let read_alias = ctx.naming().read_alias(&app.name);
    let write_alias = ctx.naming().write_alias(&app.name);
    let mut transaction = ctx.indices.start_alias_transaction();
    transaction
        .associate_indices_with_alias(&read_alias, [new_index.clone()])
        .associate_indices_with_alias(&write_alias, [new_index.clone()])
        .dissociate_indices_from_alias(&write_alias, [old_index.clone()]);
    transaction.commit().await?;

    info!(old_index = %old_index, new_index = %new_index, "Moved write alias to new index");

    schedule_completion(ctx, app).await?;
    Ok(MigrationOutcome::Started {
        old_index,
        new_index,
    })
}

async fn schedule_completion(ctx: &SearchContext, app: &SearchApp) -> Result<(), SearchSyncError> {
    ctx.scheduler
        .schedule_default(SearchJob::CompleteModelMigration {
            app: app.name.clone(),
            new_mapping_hash: ctx.indices.get_target_mapping_hash(app),
        })
        .await?;
    Ok(())
}

/// Lock serialising completion jobs of one app.
pub fn resync_lock_key(app: &str) -> String {
    format!("search-resync-after-migrate-{}", app)
}

/// Finish a migration: resync into the new index and retire the old ones.
///
/// Runs under a per-app advisory lock; if another completion job holds it,
/// this one exits successfully without doing anything.
///
/// # Errors
///
/// Fails with [`SearchSyncError::StaleMigrationTarget`] without touching
/// aliases or indices if the app's mapping no longer hashes to
/// `new_mapping_hash`.
#[instrument(skip(ctx))]
pub async fn complete_model_migration(
    ctx: &SearchContext,
    app_name: &str,
    new_mapping_hash: &str,
) -> Result<(), SearchSyncError> {
    let app = ctx.app(app_name)?;
    let key = resync_lock_key(app_name);

    let Some(guard) = ctx.locks.try_acquire(&key).await? else {
        info!(lock = %key, "Another migration completion job is running, skipping");
        return Ok(());
    };

    let result = async {
        let current = ctx.indices.get_target_mapping_hash(&app);
        if current != new_mapping_hash {
            return Err(SearchSyncError::StaleMigrationTarget {
                app: app.name.clone(),
                expected: new_mapping_hash.to_string(),
                current,
            });
        }
        resync_after_migrate(ctx, &app).await
    }
    .await;

    if let Err(e) = guard.release().await {
        warn!(lock = %key, error = %e, "Failed to release lock");
    }
    result
}
