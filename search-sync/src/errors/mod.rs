//! Error types for the search sync engine.

use std::collections::BTreeSet;

use search_sync_repository::{JobStoreError, LockError, SearchIndexError, SourceError};
use thiserror::Error;

/// Errors that can occur while syncing, migrating or searching.
#[derive(Error, Debug)]
pub enum SearchSyncError {
    /// The write index is not one of the read indices. Indicates a previous
    /// bug; never repaired automatically.
    #[error("Consistency error: write index {write_index} of {app} is not in its read indices {read_indices:?}")]
    Consistency {
        app: String,
        write_index: String,
        read_indices: BTreeSet<String>,
    },

    /// The app's aliases do not exist yet (or are malformed).
    #[error("Search app {app} is not initialised: {reason}")]
    NotInitialised { app: String, reason: String },

    /// A migration completion job was scheduled for a mapping that is no
    /// longer the target mapping.
    #[error("Stale migration target for {app}: job expected mapping {expected}, current target is {current}")]
    StaleMigrationTarget {
        app: String,
        expected: String,
        current: String,
    },

    /// No search app is registered under this name.
    #[error("Unknown search app: {0}")]
    UnknownApp(String),

    /// Items of a bulk request were rejected.
    #[error("Bulk request to {index} failed for {failed} item(s), first error: {first_error}")]
    BulkItemsFailed {
        index: String,
        failed: usize,
        first_error: String,
    },

    /// A background job payload could not be (de)serialised.
    #[error("Job payload error: {0}")]
    JobPayload(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    SearchIndex(#[from] SearchIndexError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    JobStore(#[from] JobStoreError),
}

impl SearchSyncError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not-initialised error.
    pub fn not_initialised(app: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotInitialised {
            app: app.into(),
            reason: reason.into(),
        }
    }

    /// Whether a background job failing with this error should be retried.
    ///
    /// Stale migration targets and backend failures are retried; consistency
    /// violations and programming or configuration errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StaleMigrationTarget { .. }
            | Self::BulkItemsFailed { .. }
            | Self::Source(_)
            | Self::Lock(_)
            | Self::JobStore(_) => true,
            Self::SearchIndex(e) => e.is_transient(),
            Self::Consistency { .. }
            | Self::NotInitialised { .. }
            | Self::UnknownApp(_)
            | Self::JobPayload(_)
            | Self::Config(_) => false,
        }
    }
}
