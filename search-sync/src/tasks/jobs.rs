//! Background job descriptions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue for jobs that may run for hours.
pub const LONG_RUNNING_QUEUE: &str = "long-running";

/// Queue for short jobs triggered by individual changes.
pub const DEFAULT_QUEUE: &str = "default";

/// Timeout of jobs that resync a whole app.
const SYNC_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

/// Timeout of jobs that sync a handful of objects.
const OBJECT_SYNC_TIMEOUT: Duration = Duration::from_secs(180);

const DEFAULT_MAX_RETRIES: u32 = 3;

/// A unit of background work, stored as JSON in the job store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchJob {
    /// Schedule a [`SearchJob::SyncModel`] for every registered app.
    SyncAllModels {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_size: Option<usize>,
    },
    /// Resync every row of one app.
    SyncModel {
        app: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_size: Option<usize>,
    },
    /// Sync specific rows of one app.
    SyncObjects { app: String, ids: Vec<Uuid> },
    /// Finish a migration to the mapping with the given hash.
    CompleteModelMigration {
        app: String,
        new_mapping_hash: String,
    },
}

impl SearchJob {
    /// Options a job of this kind is scheduled with unless overridden.
    pub fn default_options(&self) -> JobOptions {
        match self {
            Self::SyncObjects { .. } => JobOptions {
                queue: DEFAULT_QUEUE.to_string(),
                timeout: OBJECT_SYNC_TIMEOUT,
                ..JobOptions::default()
            },
            Self::SyncAllModels { .. } | Self::SyncModel { .. } | Self::CompleteModelMigration { .. } => {
                JobOptions::default()
            }
        }
    }

    /// Name of the job kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SyncAllModels { .. } => "sync_all_models",
            Self::SyncModel { .. } => "sync_model",
            Self::SyncObjects { .. } => "sync_objects",
            Self::CompleteModelMigration { .. } => "complete_model_migration",
        }
    }
}

/// How a job is queued and retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOptions {
    pub queue: String,
    /// Maximum run time of one attempt.
    pub timeout: Duration,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Whether retries wait with exponential backoff.
    pub retry_backoff: bool,
    /// Delay before the first attempt.
    pub delay: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            queue: LONG_RUNNING_QUEUE.to_string(),
            timeout: SYNC_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: true,
            delay: Duration::ZERO,
        }
    }
}
