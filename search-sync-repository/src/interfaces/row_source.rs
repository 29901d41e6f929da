use async_trait::async_trait;
use futures::stream::BoxStream;
use search_sync_shared::SourceRow;
use uuid::Uuid;

use crate::errors::SourceError;

/// Stream of primary keys in sync order.
pub type KeyStream<'a> = BoxStream<'a, Result<Uuid, SourceError>>;

/// Source of truth for one entity type.
///
/// Implementations describe how to enumerate the entity's primary keys and how
/// to fetch full rows (with related rows joined in) for a set of keys.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Number of rows currently in the source. Used for progress reporting only.
    async fn count(&self) -> Result<u64, SourceError>;

    /// Stream every primary key, most recently modified first when the source
    /// has a recency column.
    ///
    /// Implementations must not buffer the whole key set in memory.
    async fn primary_keys(&self) -> Result<KeyStream<'_>, SourceError>;

    /// Fetch the rows for the given keys. Keys whose row no longer exists are
    /// skipped; the result order is unspecified.
    async fn fetch_rows(&self, ids: &[Uuid]) -> Result<Vec<SourceRow>, SourceError>;

    /// Fetch a single row.
    async fn fetch_row(&self, id: Uuid) -> Result<Option<SourceRow>, SourceError> {
        Ok(self.fetch_rows(&[id]).await?.into_iter().next())
    }
}
