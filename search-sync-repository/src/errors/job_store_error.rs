use thiserror::Error;

/// Represents errors that can occur within the job store.
#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    /// The referenced job does not exist.
    #[error("Job not found: {0}")]
    NotFound(i64),
}
