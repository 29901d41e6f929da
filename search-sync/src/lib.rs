//! # Search Sync
//!
//! Keeps OpenSearch indices consistent with the PostgreSQL source of truth
//! and migrates them to new mappings without downtime.
//!
//! ## Architecture
//!
//! Every entity type is a [`SearchApp`] with two aliases:
//!
//! - `<prefix>-<app>-read`: every index searches run against
//! - `<prefix>-<app>-write`: the single index writes go to
//!
//! Index names carry a hash of the mapping they were created with. When the
//! mapping changes, [`migrate`] creates a new index and moves the write alias
//! to it while reads keep being served from both; a background job then
//! resyncs every row and retires the old index.
//!
//! ## Modules
//!
//! - [`apps`]: registered entity types and their mappings
//! - [`mapper`]: row to document conversion helpers
//! - [`indices`]: index and alias management
//! - [`bulk_sync`]: batched resync of a whole app
//! - [`migrate`] / [`migrate_utils`]: mapping migrations
//! - [`sync_object`] / [`deletion`]: keeping documents in step with row changes
//! - [`tasks`]: background jobs, their scheduler and worker
//! - [`search`]: query execution
//! - [`commands`]: operator commands
//! - [`config`]: configuration and dependency initialization
//! - [`errors`]: error types

pub mod apps;
pub mod bulk_sync;
pub mod commands;
pub mod config;
pub mod context;
pub mod deletion;
pub mod errors;
pub mod indices;
pub mod mapper;
pub mod migrate;
pub mod migrate_utils;
pub mod search;
pub mod sync_object;
pub mod tasks;

pub use apps::{SearchApp, SearchAppRegistry};
pub use config::{Dependencies, Settings};
pub use context::SearchContext;
pub use errors::SearchSyncError;
pub use indices::{IndexManager, IndexNaming};
