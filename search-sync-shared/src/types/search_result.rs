//! Search result types for the search API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::document::Document;

/// Number of matching documents holding one value of an aggregated field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregationBucket {
    pub key: Value,
    pub doc_count: u64,
}

impl AggregationBucket {
    pub fn new(key: impl Into<Value>, doc_count: u64) -> Self {
        Self {
            key: key.into(),
            doc_count,
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchPage {
    /// Total number of matching documents.
    /// May be greater than the number of returned results due to pagination.
    pub total: u64,

    /// The documents of the requested page, in sort order.
    pub results: Vec<Document>,

    /// Value counts per requested aggregation field, most frequent first.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aggregations: BTreeMap<String, Vec<AggregationBucket>>,
}

impl SearchPage {
    /// Create an empty page.
    pub fn empty() -> Self {
        Self::new(0, Vec::new())
    }

    /// Create a new page.
    pub fn new(total: u64, results: Vec<Document>) -> Self {
        Self {
            total,
            results,
            aggregations: BTreeMap::new(),
        }
    }

    /// Attach aggregation buckets.
    pub fn with_aggregations(
        mut self,
        aggregations: BTreeMap<String, Vec<AggregationBucket>>,
    ) -> Self {
        self.aggregations = aggregations;
        self
    }

    /// Buckets of one aggregation, empty when it was not requested.
    pub fn buckets(&self, field: &str) -> &[AggregationBucket] {
        self.aggregations.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Check if the page has no results.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Ids of the documents on this page, in order.
    pub fn ids(&self) -> Vec<&str> {
        self.results.iter().map(|doc| doc.id.as_str()).collect()
    }
}

/// A document found by a basic search, with the entity it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityDocument {
    pub entity: String,
    #[serde(flatten)]
    pub document: Document,
}

/// One page of a basic search across entities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BasicSearchPage {
    /// Matches among the selected entities.
    pub total: u64,

    pub results: Vec<EntityDocument>,

    /// Matches per entity, over every entity regardless of the selection.
    /// Entities without matches are absent.
    pub counts_by_entity: BTreeMap<String, u64>,
}

impl BasicSearchPage {
    pub fn count_for(&self, entity: &str) -> u64 {
        self.counts_by_entity.get(entity).copied().unwrap_or(0)
    }
}
