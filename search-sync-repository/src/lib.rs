//! # Search Sync Repository
//!
//! This crate provides the backend seams of the search sync engine and their
//! implementations:
//!
//! - [`SearchIndexProvider`]: the search cluster (OpenSearch, in-memory)
//! - [`RowSource`]: the source of truth for one entity (PostgreSQL, in-memory)
//! - [`AdvisoryLock`]: named cross-process locks (PostgreSQL, in-memory)
//! - [`JobStore`]: the durable background job queue (PostgreSQL, in-memory)
//!
//! It also builds search request bodies from [`search_sync_shared::SearchQuery`]
//! values in [`queries`].

pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod opensearch;
pub mod postgres;
pub mod queries;
pub mod types;

pub use errors::{JobStoreError, LockError, SearchIndexError, SourceError};
pub use interfaces::{AdvisoryLock, JobStore, KeyStream, LockGuard, RowSource, SearchIndexProvider};
pub use opensearch::{IndexSettings, OpenSearchProvider};
pub use queries::SearchQueryBuilder;
pub use types::{
    AliasAction, BatchOperationResult, BatchOperationSummary, BulkAction, JobStatus, NewJob,
    SearchHit, SearchHits, StoredJob,
};
