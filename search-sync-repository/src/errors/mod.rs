//! Error types for the search sync repository.
//!
//! One error type per backend seam: the search cluster, the row source, the
//! advisory lock and the job store.

mod job_store_error;
mod lock_error;
mod search_index_error;
mod source_error;

pub use job_store_error::JobStoreError;
pub use lock_error::LockError;
pub use search_index_error::SearchIndexError;
pub use source_error::SourceError;
