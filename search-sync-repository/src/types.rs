//! Request and response types for the backend interfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One action of an atomic alias update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasAction {
    /// Point `alias` at `indices` (in addition to what it already references).
    Add { alias: String, indices: Vec<String> },
    /// Stop `alias` from referencing `indices`.
    Remove { alias: String, indices: Vec<String> },
}

impl AliasAction {
    /// Render the action in `_aliases` request format.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Add { alias, indices } => json!({
                "add": {"alias": alias, "indices": indices}
            }),
            Self::Remove { alias, indices } => json!({
                "remove": {"alias": alias, "indices": indices}
            }),
        }
    }
}

/// One action of a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    /// Create or overwrite the document `id` in `index`.
    Index {
        index: String,
        id: String,
        source: Map<String, Value>,
    },
    /// Delete the document `id` from `index`.
    Delete { index: String, id: String },
}

impl BulkAction {
    /// The index (or alias) this action targets.
    pub fn index(&self) -> &str {
        match self {
            Self::Index { index, .. } | Self::Delete { index, .. } => index,
        }
    }

    /// The document id this action targets.
    pub fn id(&self) -> &str {
        match self {
            Self::Index { id, .. } | Self::Delete { id, .. } => id,
        }
    }
}

/// Result of a bulk operation for a single item.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOperationResult {
    /// The index the item was applied to.
    pub index: String,
    /// The document id.
    pub id: String,
    /// HTTP-style status reported for the item.
    pub status: u16,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error reason if the operation failed.
    pub error: Option<String>,
}

impl BatchOperationResult {
    /// Whether this item failed only because the document did not exist.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Summary of a bulk operation containing aggregate statistics and individual results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchOperationSummary {
    /// Total number of items in the batch.
    pub total: usize,
    /// Number of successful operations.
    pub succeeded: usize,
    /// Number of failed operations.
    pub failed: usize,
    /// Individual results for each item.
    pub results: Vec<BatchOperationResult>,
}

impl BatchOperationSummary {
    /// Build a summary from per-item results.
    pub fn from_results(results: Vec<BatchOperationResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    /// Failed items, excluding deletes of documents that did not exist.
    pub fn failures_ignoring_not_found(&self) -> Vec<&BatchOperationResult> {
        self.results
            .iter()
            .filter(|r| !r.success && !r.is_not_found())
            .collect()
    }
}

/// One document returned by a search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub index: String,
    pub id: String,
    pub score: Option<f64>,
    pub source: Map<String, Value>,
}

/// Raw search response: total match count, the requested page of hits and
/// the `aggregations` object as returned by the cluster.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchHits {
    pub total: u64,
    pub hits: Vec<SearchHit>,
    pub aggregations: Map<String, Value>,
}

/// Lifecycle status of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Database representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// A job to be added to the job store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    /// Queue the job is placed on; workers choose which queues they serve.
    pub queue: String,
    /// Serialised job description.
    pub payload: Value,
    /// Maximum run time of one attempt, in seconds.
    pub timeout_secs: u64,
    /// How many times a failed attempt may be retried.
    pub max_retries: u32,
    /// Whether retries are delayed with exponential backoff.
    pub retry_backoff: bool,
    /// Earliest time the job may run.
    pub run_at: DateTime<Utc>,
}

/// A job claimed from the job store for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredJob {
    pub id: i64,
    pub queue: String,
    pub payload: Value,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff: bool,
    /// Number of attempts including the current one.
    pub attempts: u32,
}

impl StoredJob {
    /// Whether another attempt is allowed after the current one fails.
    pub fn can_retry(&self) -> bool {
        self.attempts <= self.max_retries
    }
}
