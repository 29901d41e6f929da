//! In-process advisory locks.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::errors::LockError;
use crate::interfaces::{AdvisoryLock, HeldLock, LockGuard};

#[derive(Debug, Default)]
struct LockTable {
    held: Mutex<BTreeSet<String>>,
    released: Notify,
}

impl LockTable {
    fn held(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unlock(&self, key: &str) -> bool {
        let removed = self.held().remove(key);
        if removed {
            self.released.notify_waiters();
        }
        removed
    }
}

/// [`AdvisoryLock`] shared by everything holding a clone of it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAdvisoryLock {
    table: Arc<LockTable>,
}

impl InMemoryAdvisoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the named lock is currently held.
    pub fn is_held(&self, key: &str) -> bool {
        self.table.held().contains(key)
    }

    fn guard(&self, key: &str) -> LockGuard {
        LockGuard::new(
            key,
            Box::new(InMemoryHeldLock {
                key: key.to_string(),
                table: Some(self.table.clone()),
            }),
        )
    }
}

struct InMemoryHeldLock {
    key: String,
    table: Option<Arc<LockTable>>,
}

#[async_trait]
impl HeldLock for InMemoryHeldLock {
    async fn release(mut self: Box<Self>) -> Result<(), LockError> {
        match self.table.take() {
            Some(table) if table.unlock(&self.key) => Ok(()),
            _ => Err(LockError::NotHeld(self.key.clone())),
        }
    }
}

impl Drop for InMemoryHeldLock {
    fn drop(&mut self) {
        if let Some(table) = self.table.take() {
            table.unlock(&self.key);
        }
    }
}

#[async_trait]
impl AdvisoryLock for InMemoryAdvisoryLock {
    async fn try_acquire(&self, key: &str) -> Result<Option<LockGuard>, LockError> {
        let acquired = self.table.held().insert(key.to_string());
        Ok(acquired.then(|| self.guard(key)))
    }

    async fn acquire(&self, key: &str) -> Result<LockGuard, LockError> {
        loop {
            // Register for the wake-up before checking, so a release between
            // the check and the wait is not missed.
            let released = self.table.released.notified();
            if self.table.held().insert(key.to_string()) {
                return Ok(self.guard(key));
            }
            released.await;
        }
    }
}
