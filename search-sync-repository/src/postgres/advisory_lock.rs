//! PostgreSQL session-level advisory locks.

use async_trait::async_trait;
use sqlx::{pool::PoolConnection, PgPool, Postgres};
use tracing::{debug, warn};

use crate::errors::LockError;
use crate::interfaces::{AdvisoryLock, HeldLock, LockGuard};

/// Advisory locks keyed by name, held for the lifetime of a pooled connection.
///
/// Lock names are hashed with `hashtext` into Postgres' advisory lock space.
#[derive(Clone)]
pub struct PostgresAdvisoryLock {
    pool: PgPool,
}

impl PostgresAdvisoryLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct PostgresHeldLock {
    key: String,
    conn: Option<PoolConnection<Postgres>>,
}

#[async_trait]
impl HeldLock for PostgresHeldLock {
    async fn release(mut self: Box<Self>) -> Result<(), LockError> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let released: bool = sqlx::query_scalar("SELECT pg_advisory_unlock(hashtext($1))")
            .bind(&self.key)
            .fetch_one(&mut *conn)
            .await?;

        if !released {
            return Err(LockError::NotHeld(self.key.clone()));
        }

        debug!(lock = %self.key, "Released advisory lock");
        Ok(())
    }
}

impl Drop for PostgresHeldLock {
    fn drop(&mut self) {
        // Closing the session releases every lock it holds; returning the
        // connection to the pool would leak the lock to the next borrower.
        if let Some(conn) = self.conn.take() {
            warn!(lock = %self.key, "Advisory lock dropped without release, closing its connection");
            drop(conn.detach());
        }
    }
}

#[async_trait]
impl AdvisoryLock for PostgresAdvisoryLock {
    async fn try_acquire(&self, key: &str) -> Result<Option<LockGuard>, LockError> {
        let mut conn = self.pool.acquire().await?;

        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1))")
            .bind(key)
            .fetch_one(&mut *conn)
            .await?;

        if !acquired {
            debug!(lock = %key, "Advisory lock is held elsewhere");
            return Ok(None);
        }

        debug!(lock = %key, "Acquired advisory lock");
        Ok(Some(LockGuard::new(
            key,
            Box::new(PostgresHeldLock {
                key: key.to_string(),
                conn: Some(conn),
            }),
        )))
    }

    async fn acquire(&self, key: &str) -> Result<LockGuard, LockError> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query("SELECT pg_advisory_lock(hashtext($1))")
            .bind(key)
            .execute(&mut *conn)
            .await?;

        debug!(lock = %key, "Acquired advisory lock");
        Ok(LockGuard::new(
            key,
            Box::new(PostgresHeldLock {
                key: key.to_string(),
                conn: Some(conn),
            }),
        ))
    }
}
