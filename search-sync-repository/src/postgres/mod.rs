//! PostgreSQL implementations of the row source, advisory lock and job store.

mod advisory_lock;
mod job_store;
mod row_source;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub use advisory_lock::PostgresAdvisoryLock;
pub use job_store::PostgresJobStore;
pub use row_source::{PostgresRowSource, SourceQuery};

/// Connect to PostgreSQL and return a connection pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
