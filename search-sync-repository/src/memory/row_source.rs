//! In-memory row source.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::{stream, StreamExt};
use search_sync_shared::SourceRow;
use uuid::Uuid;

use crate::errors::SourceError;
use crate::interfaces::{KeyStream, RowSource};

#[derive(Debug, Default)]
struct Rows {
    rows: BTreeMap<Uuid, SourceRow>,
    // Oldest first; a re-inserted row moves to the end.
    order: Vec<Uuid>,
    vanished: BTreeSet<Uuid>,
    fetches: Vec<usize>,
}

/// [`RowSource`] over rows held in memory.
///
/// Keys stream most recently inserted first, like a source ordered by
/// modification time.
#[derive(Debug, Default)]
pub struct InMemoryRowSource {
    state: Mutex<Rows>,
}

impl InMemoryRowSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source holding the given rows, inserted in order.
    pub fn with_rows(rows: impl IntoIterator<Item = SourceRow>) -> Self {
        let source = Self::new();
        for row in rows {
            source.insert(row);
        }
        source
    }

    fn state(&self) -> MutexGuard<'_, Rows> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a row, making it the most recently modified.
    pub fn insert(&self, row: SourceRow) {
        let mut state = self.state();
        state.order.retain(|id| *id != row.id);
        state.order.push(row.id);
        state.vanished.remove(&row.id);
        state.rows.insert(row.id, row);
    }

    /// Delete a row.
    pub fn remove(&self, id: Uuid) -> Option<SourceRow> {
        let mut state = self.state();
        state.order.retain(|existing| *existing != id);
        state.rows.remove(&id)
    }

    /// Keep listing the row's key but stop returning the row, as if it was
    /// deleted between listing keys and fetching rows.
    pub fn vanish(&self, id: Uuid) {
        self.state().vanished.insert(id);
    }

    /// Number of keys requested by each `fetch_rows` call so far.
    pub fn fetch_sizes(&self) -> Vec<usize> {
        self.state().fetches.clone()
    }

    pub fn len(&self) -> usize {
        self.state().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RowSource for InMemoryRowSource {
    async fn count(&self) -> Result<u64, SourceError> {
        Ok(self.len() as u64)
    }

    async fn primary_keys(&self) -> Result<KeyStream<'_>, SourceError> {
        let keys: Vec<Uuid> = self.state().order.iter().rev().copied().collect();
        Ok(stream::iter(keys.into_iter().map(Ok)).boxed())
    }

    async fn fetch_rows(&self, ids: &[Uuid]) -> Result<Vec<SourceRow>, SourceError> {
        let mut state = self.state();
        state.fetches.push(ids.len());
        Ok(ids
            .iter()
            .filter(|id| !state.vanished.contains(id))
            .filter_map(|id| state.rows.get(id).cloned())
            .collect())
    }
}
