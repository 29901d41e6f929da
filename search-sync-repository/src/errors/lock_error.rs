use thiserror::Error;

/// Represents errors that can occur while taking or releasing an advisory lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// The lock was reported as not held when releasing it.
    #[error("Lock not held: {0}")]
    NotHeld(String),
}
