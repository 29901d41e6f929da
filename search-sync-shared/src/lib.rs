//! # Search Sync Shared
//!
//! This crate defines shared data structures used across the search sync crates:
//! source rows and search documents, index mappings with their hash, and the
//! query/result types of the search API.

pub mod types;

pub use types::document::{Document, SourceRow};
pub use types::mapping::{FieldMapping, IndexMapping};
pub use types::search_query::{BasicSearchQuery, SearchQuery, MAX_RESULTS};
pub use types::search_result::{AggregationBucket, BasicSearchPage, EntityDocument, SearchPage};
