//! Search query types for the search API.
//!
//! This module defines the query structure used to search one entity's read
//! alias (a free-text term, field filters, an ordering and a page window) and
//! the basic search across several entities at once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum result window of the search cluster. `offset + limit` never
/// exceeds this.
pub const MAX_RESULTS: usize = 10_000;

/// Search query parameters for one entity.
///
/// Filter keys follow these conventions:
///
/// - `<field>_before` / `<field>_after` become a range on `<field>`
/// - `<field>_exists` matches documents with (or without) `<field>`
/// - keys ending in `.id` or `_keyword` match the value as an exact phrase
/// - array values match any of the listed values
/// - object values are sub-filters on the fields of a related object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchQuery {
    /// Free-text search term. Empty matches every document.
    #[serde(default)]
    pub term: String,

    /// Field filters, all of which a document must satisfy.
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,

    /// Sort order as `field`, `field:asc` or `field:desc`.
    /// Defaults to relevance, then id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordering: Option<String>,

    /// Offset for pagination.
    #[serde(default)]
    pub offset: usize,

    /// Maximum number of results to return.
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Fields to count distinct values of. Counts cover every document the
    /// term matches, ignoring `filters`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregations: Vec<String>,
}

fn default_limit() -> usize {
    100
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self::new("")
    }
}

impl SearchQuery {
    /// Create a query for the given term with no filters.
    ///
    /// # Example
    ///
    /// ```
    /// use search_sync_shared::SearchQuery;
    ///
    /// let query = SearchQuery::new("acme")
    ///     .with_filter("archived", false)
    ///     .with_ordering("name:desc")
    ///     .with_limit(20);
    /// ```
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            filters: BTreeMap::new(),
            ordering: None,
            offset: 0,
            limit: default_limit(),
            aggregations: Vec::new(),
        }
    }

    /// Add a filter.
    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    /// Set the ordering.
    pub fn with_ordering(mut self, ordering: impl Into<String>) -> Self {
        self.ordering = Some(ordering.into());
        self
    }

    /// Set the offset for pagination.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Set the limit for results.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Request value counts for a field.
    pub fn with_aggregation(mut self, field: impl Into<String>) -> Self {
        self.aggregations.push(field.into());
        self
    }

    /// The limit actually applied, clipped so that the page stays inside the
    /// cluster's result window.
    pub fn clipped_limit(&self) -> usize {
        clip_limit(self.offset, self.limit)
    }
}

fn clip_limit(offset: usize, limit: usize) -> usize {
    limit.min(MAX_RESULTS.saturating_sub(offset))
}

/// A free-text search across several entities.
///
/// Every entity is searched; `entities` only restricts which of them the
/// returned page is drawn from. Per-entity match counts always cover all of
/// them. An empty `entities` list selects every entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BasicSearchQuery {
    #[serde(default)]
    pub term: String,

    #[serde(default)]
    pub entities: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordering: Option<String>,

    #[serde(default)]
    pub offset: usize,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl BasicSearchQuery {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            entities: Vec::new(),
            ordering: None,
            offset: 0,
            limit: default_limit(),
        }
    }

    /// Draw results from `entity` (in addition to any already selected).
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entities.push(entity.into());
        self
    }

    pub fn with_ordering(mut self, ordering: impl Into<String>) -> Self {
        self.ordering = Some(ordering.into());
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn clipped_limit(&self) -> usize {
        clip_limit(self.offset, self.limit)
    }
}
