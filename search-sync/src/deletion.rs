//! Keeping the index in step with row changes and deletions.

use std::collections::BTreeMap;

use search_sync_repository::BulkAction;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::bulk_sync::execute_bulk;
use crate::context::SearchContext;
use crate::errors::SearchSyncError;
use crate::tasks::SearchJob;

/// Maximum number of deletions sent in one bulk request.
pub const DELETION_CHUNK_SIZE: usize = 10_000;

/// Entry point for the application layer to report row changes.
#[derive(Clone)]
pub struct ChangeNotifier {
    ctx: SearchContext,
}

impl ChangeNotifier {
    pub fn new(ctx: SearchContext) -> Self {
        Self { ctx }
    }

    /// A row was created or updated. Schedules a job syncing it.
    pub async fn notify_changed(&self, app: &str, pk: Uuid) -> Result<i64, SearchSyncError> {
        self.ctx.app(app)?;
        self.ctx
            .scheduler
            .schedule_default(SearchJob::SyncObjects {
                app: app.to_string(),
                ids: vec![pk],
            })
            .await
    }

    /// Rows whose documents embed a changed row. Schedules one job syncing
    /// all of them, or nothing when `pks` is empty.
    pub async fn notify_related_changed(
        &self,
        app: &str,
        pks: &[Uuid],
    ) -> Result<Option<i64>, SearchSyncError> {
        self.ctx.app(app)?;
        if pks.is_empty() {
            return Ok(None);
        }
        let id = self
            .ctx
            .scheduler
            .schedule_default(SearchJob::SyncObjects {
                app: app.to_string(),
                ids: pks.to_vec(),
            })
            .await?;
        Ok(Some(id))
    }

    /// A row was deleted. Removes its document from every read index now.
    #[instrument(skip(self))]
    pub async fn notify_deleted(&self, app: &str, pk: Uuid) -> Result<(), SearchSyncError> {
        let app = self.ctx.app(app)?;
        let read_alias = self.ctx.naming().read_alias(&app.name);
        let indices = self.ctx.provider().get_indices_for_alias(&read_alias).await?;
        let id = pk.to_string();
        for index in &indices {
            self.ctx.provider().delete_document(index, &id).await?;
        }
        debug!(indices = indices.len(), "Deleted document");
        Ok(())
    }
}

/// Collects rows deleted in a batch operation and removes their documents
/// in bulk afterwards.
pub struct DeletionCollector {
    ctx: SearchContext,
    pending: BTreeMap<String, Vec<Uuid>>,
}

impl DeletionCollector {
    pub fn new(ctx: SearchContext) -> Self {
        Self {
            ctx,
            pending: BTreeMap::new(),
        }
    }

    pub fn collect(&mut self, app: &str, pk: Uuid) -> Result<(), SearchSyncError> {
        self.ctx.app(app)?;
        self.pending.entry(app.to_string()).or_default().push(pk);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.values().all(Vec::is_empty)
    }

    /// Delete every collected document from every read index of its app.
    ///
    /// Documents that are already gone are ignored. Each chunk is sent with
    /// [`crate::bulk_sync::BULK_REQUEST_TIMEOUT`] and leaves the collector only
    /// once its request succeeded, so a failed flush can be retried. Returns
    /// the number of delete actions sent.
    pub async fn flush(&mut self) -> Result<usize, SearchSyncError> {
        let apps: Vec<String> = self.pending.keys().cloned().collect();
        let mut sent = 0;

        for app in apps {
            let read_alias = self.ctx.naming().read_alias(&app);
            let indices = self.ctx.provider().get_indices_for_alias(&read_alias).await?;
            if indices.is_empty() {
                debug!(app = %app, "No read indices; dropping deletions");
                self.pending.remove(&app);
                continue;
            }

            let ids_per_chunk = (DELETION_CHUNK_SIZE / indices.len()).max(1);
            let mut documents = 0;
            loop {
                let Some(ids) = self.pending.get(&app).filter(|ids| !ids.is_empty()) else {
                    break;
                };
                let take = ids_per_chunk.min(ids.len());
                let actions: Vec<BulkAction> = indices
                    .iter()
                    .flat_map(|index| {
                        ids[..take].iter().map(move |id| BulkAction::Delete {
                            index: index.clone(),
                            id: id.to_string(),
                        })
                    })
                    .collect();

                execute_bulk(self.ctx.provider().as_ref(), &actions, &read_alias, true).await?;
                sent += actions.len();
                documents += take;
                if let Some(ids) = self.pending.get_mut(&app) {
                    ids.drain(..take);
                }
            }

            self.pending.remove(&app);
            info!(app = %app, documents, indices = indices.len(), "Flushed deletions");
        }

        Ok(sent)
    }
}
