//! Shared handles passed to every engine operation.

use std::sync::Arc;

use search_sync_repository::{AdvisoryLock, SearchIndexProvider};

use crate::apps::{SearchApp, SearchAppRegistry};
use crate::errors::SearchSyncError;
use crate::indices::{IndexManager, IndexNaming};
use crate::tasks::JobScheduler;

/// Everything the engine needs: the cluster, the registered apps, the job
/// scheduler and the advisory locks.
#[derive(Clone)]
pub struct SearchContext {
    pub indices: IndexManager,
    pub registry: Arc<SearchAppRegistry>,
    pub scheduler: Arc<dyn JobScheduler>,
    pub locks: Arc<dyn AdvisoryLock>,
}

impl SearchContext {
    pub fn new(
        provider: Arc<dyn SearchIndexProvider>,
        naming: IndexNaming,
        registry: Arc<SearchAppRegistry>,
        scheduler: Arc<dyn JobScheduler>,
        locks: Arc<dyn AdvisoryLock>,
    ) -> Self {
        Self {
            indices: IndexManager::new(provider, naming),
            registry,
            scheduler,
            locks,
        }
    }

    pub fn provider(&self) -> &Arc<dyn SearchIndexProvider> {
        self.indices.provider()
    }

    pub fn naming(&self) -> &IndexNaming {
        self.indices.naming()
    }

    /// Look up a registered app.
    pub fn app(&self, name: &str) -> Result<Arc<SearchApp>, SearchSyncError> {
        self.registry.get(name)
    }
}
