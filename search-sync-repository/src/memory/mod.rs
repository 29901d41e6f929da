//! In-memory implementations of every backend.
//!
//! Used by the test suites and for running the engine locally without a
//! cluster or database.

mod advisory_lock;
mod job_store;
mod provider;
pub mod query_eval;
mod row_source;

pub use advisory_lock::InMemoryAdvisoryLock;
pub use job_store::{InMemoryJobStore, JobRecord};
pub use provider::InMemorySearchProvider;
pub use row_source::InMemoryRowSource;
