//! Search index provider trait definition.
//!
//! This module defines the abstract interface to the search cluster, allowing
//! for different backend implementations (OpenSearch, in-memory, etc.).

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use search_sync_shared::IndexMapping;
use serde_json::Value;

use crate::errors::SearchIndexError;
use crate::types::{AliasAction, BatchOperationSummary, BulkAction, SearchHits};

/// Abstracts the underlying search cluster (OpenSearch, Elasticsearch, in-memory).
///
/// Implementations are injected into the sync engine to enable dependency
/// injection and easy testing with mock implementations. Every method that takes
/// an index name also accepts an alias wherever the cluster does: writes through
/// an alias require it to reference exactly one index.
///
/// All methods return `Result<T, SearchIndexError>` for consistent error handling
/// across different backend implementations.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Create an index with the shared analysis settings and the given mapping.
    ///
    /// # Arguments
    ///
    /// * `index` - Physical index name
    /// * `mapping` - Field layout of the index
    /// * `aliases` - Aliases to attach atomically at creation time
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the index was created
    /// * `Err(SearchIndexError)` - If creation fails, including when the index
    ///   already exists
    async fn create_index(
        &self,
        index: &str,
        mapping: &IndexMapping,
        aliases: &[String],
    ) -> Result<(), SearchIndexError>;

    /// Check whether an index exists.
    async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError>;

    /// Delete an index.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the index was deleted
    /// * `Err(SearchIndexError::IndexNotFound)` - If there was no such index
    async fn delete_index(&self, index: &str) -> Result<(), SearchIndexError>;

    /// List the names of all indices matching a wildcard pattern (`search-*`).
    async fn list_indices(&self, pattern: &str) -> Result<BTreeSet<String>, SearchIndexError>;

    /// Check whether an alias exists.
    async fn alias_exists(&self, alias: &str) -> Result<bool, SearchIndexError>;

    /// Get the indices an alias references. Missing aliases reference nothing.
    async fn get_indices_for_alias(&self, alias: &str)
        -> Result<BTreeSet<String>, SearchIndexError>;

    /// Get the aliases that reference an index.
    async fn get_aliases_for_index(&self, index: &str)
        -> Result<BTreeSet<String>, SearchIndexError>;

    /// Apply alias changes in a single atomic request.
    ///
    /// Either every action is applied or none is.
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchIndexError>;

    /// Execute a bulk request and return a summary of per-item outcomes.
    ///
    /// # Arguments
    ///
    /// * `actions` - Index and delete actions, applied in order
    /// * `timeout` - Client-side timeout for the whole request
    ///
    /// # Returns
    ///
    /// * `Ok(BatchOperationSummary)` - Per-item results; item failures are
    ///   reported here rather than as an error
    /// * `Err(SearchIndexError)` - If the request failed as a whole
    async fn bulk(
        &self,
        actions: &[BulkAction],
        timeout: Duration,
    ) -> Result<BatchOperationSummary, SearchIndexError>;

    /// Delete one document. A missing document is not an error.
    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchIndexError>;

    /// Execute a search request body against an index or alias, or a
    /// comma-separated list of them.
    async fn search(&self, index: &str, body: &Value) -> Result<SearchHits, SearchIndexError>;

    /// Make recent writes to an index visible to searches.
    async fn refresh(&self, index: &str) -> Result<(), SearchIndexError>;
}
