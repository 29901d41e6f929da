//! Search index error types.
//!
//! This module defines the unified error type for all search cluster operations:
//! index and alias management, bulk writes, single-document deletes and queries.

use thiserror::Error;

/// Unified errors from search cluster operations.
///
/// Used by every `SearchIndexProvider` implementation. Includes both transport
/// failures (connection, response parsing) and cluster-side rejections (missing
/// index, failed alias update, bulk item failures).
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// Validation error (e.g., an alias that resolves to several write targets).
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Failed to establish connection to the search cluster.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Failed to create an index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// Failed to delete an index.
    #[error("Index deletion error: {0}")]
    IndexDeletionError(String),

    /// The named index or alias does not exist.
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Failed to read or update aliases.
    #[error("Alias error: {0}")]
    AliasError(String),

    /// Bulk operation failed as a whole.
    #[error("Bulk index error: {0}")]
    BulkIndexError(String),

    /// Failed to delete a document.
    #[error("Delete error: {0}")]
    DeleteError(String),

    /// Failed to execute a search.
    #[error("Search error: {0}")]
    SearchError(String),

    /// Failed to parse response from the search cluster.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Any other failed request.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl SearchIndexError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Create an index deletion error.
    pub fn index_deletion(msg: impl Into<String>) -> Self {
        Self::IndexDeletionError(msg.into())
    }

    /// Create an index not found error.
    pub fn index_not_found(name: impl Into<String>) -> Self {
        Self::IndexNotFound(name.into())
    }

    /// Create an alias error.
    pub fn alias(msg: impl Into<String>) -> Self {
        Self::AliasError(msg.into())
    }

    /// Create a bulk index error.
    pub fn bulk_index(msg: impl Into<String>) -> Self {
        Self::BulkIndexError(msg.into())
    }

    /// Create a delete error.
    pub fn delete(msg: impl Into<String>) -> Self {
        Self::DeleteError(msg.into())
    }

    /// Create a search error.
    pub fn search(msg: impl Into<String>) -> Self {
        Self::SearchError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create an unknown error.
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Whether retrying the same request later may succeed.
    ///
    /// Transport and cluster-side failures are transient; validation and
    /// missing-index errors are not.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::ValidationError(_) | Self::IndexNotFound(_)
        )
    }
}
