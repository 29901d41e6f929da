//! Dependency initialization and wiring.

use std::sync::Arc;

use search_sync_repository::postgres::{
    self, PostgresAdvisoryLock, PostgresJobStore, PostgresRowSource,
};
use search_sync_repository::{
    AdvisoryLock, IndexSettings, JobStore, OpenSearchProvider, RowSource, SearchIndexProvider,
    SourceError,
};
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::{info, warn};

use super::settings::{ConnectionMode, Settings};
use crate::apps::{SearchAppRegistry, ENTITIES};
use crate::context::SearchContext;
use crate::errors::SearchSyncError;
use crate::indices::IndexNaming;
use crate::tasks::{JobScheduler, QueuedJobScheduler};

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub settings: Settings,
    /// Engine handles shared by every command.
    pub context: SearchContext,
    /// Store the worker claims jobs from.
    pub job_store: Arc<dyn JobStore>,
}

impl Dependencies {
    /// Connect to OpenSearch and PostgreSQL and wire the engine.
    ///
    /// In [`ConnectionMode::Retry`] the OpenSearch connection is retried at
    /// `retry_interval` until it succeeds; in fail-fast mode the first
    /// failure is returned.
    pub async fn new(settings: Settings) -> Result<Self, SearchSyncError> {
        info!(
            opensearch_url = %settings.opensearch_url,
            index_prefix = %settings.index_prefix,
            connection_mode = ?settings.connection_mode,
            retry_interval_secs = settings.retry_interval.as_secs(),
            "Initializing dependencies"
        );

        let provider: Arc<dyn SearchIndexProvider> =
            Arc::new(Self::connect_to_opensearch(&settings).await?);
        info!("OpenSearch connection established");

        let pool = postgres::connect(&settings.database_url, settings.database_max_connections)
            .await
            .map_err(|e| SearchSyncError::config(format!("Failed to connect to PostgreSQL: {}", e)))?;
        info!("PostgreSQL connection established");

        let job_store = PostgresJobStore::new(pool.clone());
        job_store.run_migrations().await?;
        let job_store: Arc<dyn JobStore> = Arc::new(job_store);

        let registry = SearchAppRegistry::from_descriptors(
            ENTITIES,
            settings.bulk_batch_size,
            |descriptor| -> Result<Arc<dyn RowSource>, SourceError> {
                Ok(Arc::new(PostgresRowSource::new(
                    pool.clone(),
                    (descriptor.source_query)(),
                )?))
            },
        )?;
        info!(apps = ?registry.names(), "Registered search apps");

        let scheduler: Arc<dyn JobScheduler> = Arc::new(QueuedJobScheduler::new(job_store.clone()));
        let locks: Arc<dyn AdvisoryLock> = Arc::new(PostgresAdvisoryLock::new(pool));

        let context = SearchContext::new(
            provider,
            IndexNaming::new(settings.index_prefix.clone()),
            Arc::new(registry),
            scheduler,
            locks,
        );

        Ok(Self {
            settings,
            context,
            job_store,
        })
    }

    async fn connect_to_opensearch(settings: &Settings) -> Result<OpenSearchProvider, SearchSyncError> {
        let url = settings.opensearch_url.as_str();
        let index_settings =
            IndexSettings::new(settings.number_of_shards, settings.number_of_replicas);

        let attempt = || async {
            let provider = OpenSearchProvider::new(url, index_settings.clone()).await?;
            provider.ping().await?;
            Ok::<_, search_sync_repository::SearchIndexError>(provider)
        };

        let result = match settings.connection_mode {
            ConnectionMode::FailFast => attempt().await,
            ConnectionMode::Retry => {
                let retry_interval = settings.retry_interval;
                Retry::spawn(FixedInterval::new(retry_interval), || async {
                    attempt().await.inspect_err(|e| {
                        warn!(
                            opensearch_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                    })
                })
                .await
            }
        };

        result.map_err(|e| SearchSyncError::config(format!("Failed to connect to OpenSearch: {}", e)))
    }
}
