use async_trait::async_trait;

use crate::errors::LockError;

/// A lock that is currently held by this process.
///
/// Implementations release the lock when dropped; [`LockGuard::release`] does so
/// explicitly and reports failures.
#[async_trait]
pub trait HeldLock: Send {
    async fn release(self: Box<Self>) -> Result<(), LockError>;
}

/// Guard for an acquired advisory lock.
pub struct LockGuard {
    key: String,
    inner: Option<Box<dyn HeldLock>>,
}

impl LockGuard {
    /// Wrap a backend-specific held lock.
    pub fn new(key: impl Into<String>, inner: Box<dyn HeldLock>) -> Self {
        Self {
            key: key.into(),
            inner: Some(inner),
        }
    }

    /// The lock name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock.
    pub async fn release(mut self) -> Result<(), LockError> {
        match self.inner.take() {
            Some(inner) => inner.release().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("key", &self.key).finish()
    }
}

/// Named, process-spanning mutual exclusion.
#[async_trait]
pub trait AdvisoryLock: Send + Sync {
    /// Take the lock if it is free.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(guard))` - The lock was acquired
    /// * `Ok(None)` - Another holder has the lock
    /// * `Err(LockError)` - The lock backend failed
    async fn try_acquire(&self, key: &str) -> Result<Option<LockGuard>, LockError>;

    /// Take the lock, waiting for the current holder to release it.
    async fn acquire(&self, key: &str) -> Result<LockGuard, LockError>;
}
