use thiserror::Error;

/// Represents errors that can occur while reading source-of-truth rows.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// The configured source query is unusable (e.g. an unsafe identifier).
    #[error("Invalid source query: {0}")]
    InvalidQuery(String),

    /// Any other failure of a non-database source.
    #[error("Source error: {0}")]
    Other(String),
}

impl SourceError {
    /// Create an invalid query error.
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Create a generic source error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
