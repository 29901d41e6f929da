//! Interface definitions for the backends of the search sync engine.
//!
//! These traits allow for dependency injection and swappable implementations of
//! the search cluster, the source of truth, advisory locks and the job queue.

mod advisory_lock;
mod job_store;
mod row_source;
mod search_index_provider;

pub use advisory_lock::{AdvisoryLock, HeldLock, LockGuard};
pub use job_store::JobStore;
pub use row_source::{KeyStream, RowSource};
pub use search_index_provider::SearchIndexProvider;
