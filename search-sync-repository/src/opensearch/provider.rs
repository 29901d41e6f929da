//! OpenSearch provider implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider`
//! using the OpenSearch Rust crate.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use opensearch::{
    http::{
        request::JsonBody,
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{
        IndicesCreateParts, IndicesDeleteParts, IndicesExistsAliasParts, IndicesExistsParts,
        IndicesGetAliasParts, IndicesGetParts, IndicesRefreshParts,
    },
    BulkParts, DeleteParts, OpenSearch, SearchParts,
};
use search_sync_shared::IndexMapping;
use serde_json::{json, Value};
use tracing::{debug, error, info};
use url::Url;

use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::opensearch::index_config::{index_creation_body, IndexSettings};
use crate::types::{
    AliasAction, BatchOperationResult, BatchOperationSummary, BulkAction, SearchHit, SearchHits,
};

/// OpenSearch provider implementation.
///
/// # Example
///
/// ```ignore
/// use search_sync_repository::opensearch::{IndexSettings, OpenSearchProvider};
///
/// let provider = OpenSearchProvider::new("http://localhost:9200", IndexSettings::default()).await?;
/// provider.ping().await?;
///
/// let indices = provider.get_indices_for_alias("search-company-read").await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
    settings: IndexSettings,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch provider connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `settings` - Sharding settings applied to every index this provider creates
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new provider instance
    /// * `Err(SearchIndexError)` - If connection setup fails
    pub async fn new(url: &str, settings: IndexSettings) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            number_of_shards = settings.number_of_shards,
            number_of_replicas = settings.number_of_replicas,
            "Created OpenSearch provider"
        );

        Ok(Self { client, settings })
    }

    /// Check that the cluster is reachable.
    pub async fn ping(&self) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .ping()
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        ensure_success(response, "Ping", SearchIndexError::connection).await?;
        Ok(())
    }

    /// Serialise bulk actions into newline-delimited action/source pairs.
    fn bulk_body(actions: &[BulkAction]) -> Vec<JsonBody<Value>> {
        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(actions.len() * 2);
        for action in actions {
            match action {
                BulkAction::Index { index, id, source } => {
                    body.push(json!({"index": {"_index": index, "_id": id}}).into());
                    body.push(Value::Object(source.clone()).into());
                }
                BulkAction::Delete { index, id } => {
                    body.push(json!({"delete": {"_index": index, "_id": id}}).into());
                }
            }
        }
        body
    }

    /// Read the `{index: {"aliases": {...}}}` shape returned by `_alias` requests.
    async fn get_alias_response(
        &self,
        parts: IndicesGetAliasParts<'_>,
    ) -> Result<Option<Value>, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get_alias(parts)
            .send()
            .await
            .map_err(|e| SearchIndexError::alias(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }

        let response = ensure_success(response, "Get alias", SearchIndexError::alias).await?;
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;
        Ok(Some(body))
    }
}

/// Return the response if its status is a success, otherwise log the body and
/// convert it into an error.
async fn ensure_success(
    response: Response,
    operation: &str,
    make_error: fn(String) -> SearchIndexError,
) -> Result<Response, SearchIndexError> {
    let status = response.status_code();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    error!(status = %status, body = %error_body, operation, "OpenSearch request failed");
    Err(make_error(format!(
        "{} failed with status {}: {}",
        operation, status, error_body
    )))
}

/// Parse the per-item outcomes of a `_bulk` response.
fn parse_bulk_response(body: &Value) -> Result<Vec<BatchOperationResult>, SearchIndexError> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchIndexError::parse("Bulk response has no items"))?;

    items
        .iter()
        .map(|item| {
            let outcome = item
                .as_object()
                .and_then(|op| op.values().next())
                .ok_or_else(|| SearchIndexError::parse(format!("Malformed bulk item: {}", item)))?;

            let status = outcome
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|s| u16::try_from(s).ok())
                .unwrap_or(0);
            let success = (200..300).contains(&status);
            let error = if success {
                None
            } else {
                Some(match outcome.get("error") {
                    Some(err) => err
                        .get("reason")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| err.to_string()),
                    None => outcome
                        .get("result")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                })
            };

            Ok(BatchOperationResult {
                index: string_field(outcome, "_index"),
                id: string_field(outcome, "_id"),
                status,
                success,
                error,
            })
        })
        .collect()
}

/// Parse the total, hits and aggregations of a `_search` response.
fn parse_search_response(body: &Value) -> Result<SearchHits, SearchIndexError> {
    let hits = body
        .get("hits")
        .ok_or_else(|| SearchIndexError::parse("Search response has no hits"))?;

    let total = match hits.get("total") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(total) => total.get("value").and_then(Value::as_u64).unwrap_or(0),
        None => 0,
    };

    let hits = hits
        .get("hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| SearchHit {
                    index: string_field(hit, "_index"),
                    id: string_field(hit, "_id"),
                    score: hit.get("_score").and_then(Value::as_f64),
                    source: hit
                        .get("_source")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    let aggregations = body
        .get("aggregations")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    Ok(SearchHits {
        total,
        hits,
        aggregations,
    })
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl SearchIndexProvider for OpenSearchProvider {
    async fn create_index(
        &self,
        index: &str,
        mapping: &IndexMapping,
        aliases: &[String],
    ) -> Result<(), SearchIndexError> {
        let body = index_creation_body(mapping, aliases, &self.settings);

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::index_creation(e.to_string()))?;

        ensure_success(response, "Create index", SearchIndexError::index_creation).await?;

        info!(index = %index, aliases = ?aliases, "Created index");
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        Ok(response.status_code().is_success())
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::index_deletion(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchIndexError::index_not_found(index));
        }
        ensure_success(response, "Delete index", SearchIndexError::index_deletion).await?;

        info!(index = %index, "Deleted index");
        Ok(())
    }

    async fn list_indices(&self, pattern: &str) -> Result<BTreeSet<String>, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get(IndicesGetParts::Index(&[pattern]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Ok(BTreeSet::new());
        }
        let response = ensure_success(response, "List indices", SearchIndexError::unknown).await?;
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        Ok(body
            .as_object()
            .map(|indices| indices.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn alias_exists(&self, alias: &str) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .indices()
            .exists_alias(IndicesExistsAliasParts::Name(&[alias]))
            .send()
            .await
            .map_err(|e| SearchIndexError::alias(e.to_string()))?;

        Ok(response.status_code().is_success())
    }

    async fn get_indices_for_alias(
        &self,
        alias: &str,
    ) -> Result<BTreeSet<String>, SearchIndexError> {
        let body = self
            .get_alias_response(IndicesGetAliasParts::Name(&[alias]))
            .await?;

        Ok(body
            .as_ref()
            .and_then(Value::as_object)
            .map(|indices| indices.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_aliases_for_index(
        &self,
        index: &str,
    ) -> Result<BTreeSet<String>, SearchIndexError> {
        let body = self
            .get_alias_response(IndicesGetAliasParts::Index(&[index]))
            .await?
            .ok_or_else(|| SearchIndexError::index_not_found(index))?;

        Ok(body
            .get(index)
            .and_then(|entry| entry.get("aliases"))
            .and_then(Value::as_object)
            .map(|aliases| aliases.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchIndexError> {
        if actions.is_empty() {
            return Ok(());
        }

        let body = json!({
            "actions": actions.iter().map(AliasAction::to_json).collect::<Vec<_>>()
        });

        let response = self
            .client
            .indices()
            .update_aliases()
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::alias(e.to_string()))?;

        ensure_success(response, "Update aliases", SearchIndexError::alias).await?;

        debug!(action_count = actions.len(), "Aliases updated");
        Ok(())
    }

    async fn bulk(
        &self,
        actions: &[BulkAction],
        timeout: Duration,
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        if actions.is_empty() {
            return Ok(BatchOperationSummary::default());
        }

        let response = self
            .client
            .bulk(BulkParts::None)
            .body(Self::bulk_body(actions))
            .request_timeout(timeout)
            .send()
            .await
            .map_err(|e| SearchIndexError::bulk_index(e.to_string()))?;

        let response = ensure_success(response, "Bulk", SearchIndexError::bulk_index).await?;
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        let summary = BatchOperationSummary::from_results(parse_bulk_response(&body)?);
        debug!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Bulk request completed"
        );
        Ok(summary)
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(index, id))
            .send()
            .await
            .map_err(|e| SearchIndexError::delete(e.to_string()))?;

        // 404 is acceptable - document may not exist
        if response.status_code().as_u16() != 404 {
            ensure_success(response, "Delete document", SearchIndexError::delete).await?;
        }

        debug!(index = %index, doc_id = %id, "Document deleted");
        Ok(())
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchHits, SearchIndexError> {
        let targets: Vec<&str> = index.split(',').collect();
        let response = self
            .client
            .search(SearchParts::Index(&targets))
            .body(body.clone())
            .send()
            .await
            .map_err(|e| SearchIndexError::search(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchIndexError::index_not_found(index));
        }
        let response = ensure_success(response, "Search", SearchIndexError::search).await?;
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        parse_search_response(&body)
    }

    async fn refresh(&self, index: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        ensure_success(response, "Refresh", SearchIndexError::unknown).await?;
        Ok(())
    }
}
