//! In-memory search cluster.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use search_sync_shared::IndexMapping;
use serde_json::{Map, Value};

use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::memory::query_eval::{self, Candidate};
use crate::types::{
    AliasAction, BatchOperationResult, BatchOperationSummary, BulkAction, SearchHit, SearchHits,
};

#[derive(Debug, Clone, Default)]
struct MemoryIndex {
    mapping: IndexMapping,
    documents: BTreeMap<String, Map<String, Value>>,
}

#[derive(Debug, Default)]
struct ClusterState {
    indices: BTreeMap<String, MemoryIndex>,
    aliases: BTreeMap<String, BTreeSet<String>>,
    created_indices: Vec<String>,
    alias_updates: Vec<Vec<AliasAction>>,
    bulk_requests: Vec<Vec<BulkAction>>,
    failing_ids: BTreeSet<String>,
}

impl ClusterState {
    /// Resolve an index or alias to the indices it names.
    fn resolve(&self, name: &str) -> BTreeSet<String> {
        if self.indices.contains_key(name) {
            return BTreeSet::from([name.to_string()]);
        }
        self.aliases.get(name).cloned().unwrap_or_default()
    }

    /// Resolve a write target, which must name exactly one index.
    fn resolve_write(&self, name: &str) -> Result<String, SearchIndexError> {
        let targets = self.resolve(name);
        match targets.len() {
            0 => Err(SearchIndexError::index_not_found(name)),
            1 => Ok(targets.into_iter().next().unwrap_or_default()),
            _ => Err(SearchIndexError::validation(format!(
                "alias [{}] has more than one index associated with it, can't execute a single index op",
                name
            ))),
        }
    }
}

/// [`SearchIndexProvider`] holding indices, aliases and documents in memory.
///
/// Behaves like a single-node cluster with immediate refresh. Every index
/// creation, alias update and bulk request is also recorded so tests can
/// assert on what was sent.
#[derive(Debug, Default)]
pub struct InMemorySearchProvider {
    state: Mutex<ClusterState>,
}

impl InMemorySearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Names of every index, in sorted order.
    pub fn index_names(&self) -> BTreeSet<String> {
        self.state().indices.keys().cloned().collect()
    }

    /// Indices created so far, in creation order.
    pub fn created_indices(&self) -> Vec<String> {
        self.state().created_indices.clone()
    }

    /// Alias update requests received so far, in order.
    pub fn alias_updates(&self) -> Vec<Vec<AliasAction>> {
        self.state().alias_updates.clone()
    }

    /// Bulk requests received so far, in order.
    pub fn bulk_requests(&self) -> Vec<Vec<BulkAction>> {
        self.state().bulk_requests.clone()
    }

    /// Mapping an index was created with.
    pub fn mapping_of(&self, index: &str) -> Option<IndexMapping> {
        self.state().indices.get(index).map(|i| i.mapping.clone())
    }

    /// Ids of the documents stored in an index or in every index of an alias.
    pub fn document_ids(&self, name: &str) -> BTreeSet<String> {
        let state = self.state();
        state
            .resolve(name)
            .iter()
            .filter_map(|index| state.indices.get(index))
            .flat_map(|index| index.documents.keys().cloned())
            .collect()
    }

    /// A stored document body.
    pub fn document(&self, index: &str, id: &str) -> Option<Map<String, Value>> {
        let state = self.state();
        state
            .resolve_write(index)
            .ok()
            .and_then(|index| state.indices.get(&index))
            .and_then(|index| index.documents.get(id).cloned())
    }

    /// Make every later bulk item for this document id fail with a 500.
    pub fn fail_document(&self, id: impl Into<String>) {
        self.state().failing_ids.insert(id.into());
    }

    /// Stop failing bulk items for a document id.
    pub fn heal_document(&self, id: &str) {
        self.state().failing_ids.remove(id);
    }

    /// Store a document directly, bypassing the bulk API.
    pub fn insert_document(
        &self,
        index: &str,
        id: impl Into<String>,
        source: Map<String, Value>,
    ) -> Result<(), SearchIndexError> {
        let mut state = self.state();
        let target = state.resolve_write(index)?;
        if let Some(index) = state.indices.get_mut(&target) {
            index.documents.insert(id.into(), source);
        }
        Ok(())
    }
}

fn glob_matches(pattern: &str, name: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return pattern == name;
    };
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };

    let remaining: Vec<&str> = parts.collect();
    let Some((last, middle)) = remaining.split_last() else {
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

fn item_result(index: &str, id: &str, status: u16, error: Option<&str>) -> BatchOperationResult {
    BatchOperationResult {
        index: index.to_string(),
        id: id.to_string(),
        status,
        success: (200..300).contains(&status),
        error: error.map(str::to_string),
    }
}

#[async_trait]
impl SearchIndexProvider for InMemorySearchProvider {
    async fn create_index(
        &self,
        index: &str,
        mapping: &IndexMapping,
        aliases: &[String],
    ) -> Result<(), SearchIndexError> {
        let mut state = self.state();
        if state.indices.contains_key(index) {
            return Err(SearchIndexError::index_creation(format!(
                "resource_already_exists_exception: index [{}] already exists",
                index
            )));
        }

        state.indices.insert(
            index.to_string(),
            MemoryIndex {
                mapping: mapping.clone(),
                documents: BTreeMap::new(),
            },
        );
        for alias in aliases {
            state
                .aliases
                .entry(alias.clone())
                .or_default()
                .insert(index.to_string());
        }
        state.created_indices.push(index.to_string());
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError> {
        Ok(self.state().indices.contains_key(index))
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchIndexError> {
        let mut state = self.state();
        if state.indices.remove(index).is_none() {
            return Err(SearchIndexError::index_not_found(index));
        }
        for members in state.aliases.values_mut() {
            members.remove(index);
        }
        state.aliases.retain(|_, members| !members.is_empty());
        Ok(())
    }

    async fn list_indices(&self, pattern: &str) -> Result<BTreeSet<String>, SearchIndexError> {
        Ok(self
            .state()
            .indices
            .keys()
            .filter(|name| glob_matches(pattern, name))
            .cloned()
            .collect())
    }

    async fn alias_exists(&self, alias: &str) -> Result<bool, SearchIndexError> {
        Ok(self.state().aliases.contains_key(alias))
    }

    async fn get_indices_for_alias(
        &self,
        alias: &str,
    ) -> Result<BTreeSet<String>, SearchIndexError> {
        Ok(self.state().aliases.get(alias).cloned().unwrap_or_default())
    }

    async fn get_aliases_for_index(
        &self,
        index: &str,
    ) -> Result<BTreeSet<String>, SearchIndexError> {
        let state = self.state();
        if !state.indices.contains_key(index) {
            return Err(SearchIndexError::index_not_found(index));
        }
        Ok(state
            .aliases
            .iter()
            .filter(|(_, members)| members.contains(index))
            .map(|(alias, _)| alias.clone())
            .collect())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchIndexError> {
        let mut state = self.state();

        // Validate every action first so the update is all-or-nothing.
        for action in actions {
            let (AliasAction::Add { alias, indices } | AliasAction::Remove { alias, indices }) =
                action;
            for index in indices {
                if !state.indices.contains_key(index) {
                    return Err(SearchIndexError::alias(format!(
                        "index_not_found_exception: no such index [{}]",
                        index
                    )));
                }
                if let AliasAction::Remove { .. } = action {
                    let member = state
                        .aliases
                        .get(alias)
                        .is_some_and(|members| members.contains(index));
                    if !member {
                        return Err(SearchIndexError::alias(format!(
                            "aliases_not_found_exception: aliases [{}] missing",
                            alias
                        )));
                    }
                }
            }
        }

        let mut aliases = state.aliases.clone();
        for action in actions {
            match action {
                AliasAction::Add { alias, indices } => {
                    aliases
                        .entry(alias.clone())
                        .or_default()
                        .extend(indices.iter().cloned());
                }
                AliasAction::Remove { alias, indices } => {
                    if let Some(members) = aliases.get_mut(alias) {
                        for index in indices {
                            members.remove(index);
                        }
                    }
                }
            }
        }
        aliases.retain(|_, members| !members.is_empty());

        state.aliases = aliases;
        state.alias_updates.push(actions.to_vec());
        Ok(())
    }

    async fn bulk(
        &self,
        actions: &[BulkAction],
        _timeout: Duration,
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        let mut state = self.state();
        state.bulk_requests.push(actions.to_vec());

        let mut results = Vec::with_capacity(actions.len());
        for action in actions {
            let target = match state.resolve_write(action.index()) {
                Ok(target) => target,
                Err(e) => {
                    results.push(item_result(action.index(), action.id(), 404, Some(&e.to_string())));
                    continue;
                }
            };

            if state.failing_ids.contains(action.id()) {
                results.push(item_result(&target, action.id(), 500, Some("simulated failure")));
                continue;
            }

            let Some(index) = state.indices.get_mut(&target) else {
                continue;
            };
            let result = match action {
                BulkAction::Index { id, source, .. } => {
                    let created = index.documents.insert(id.clone(), source.clone()).is_none();
                    item_result(&target, id, if created { 201 } else { 200 }, None)
                }
                BulkAction::Delete { id, .. } => match index.documents.remove(id) {
                    Some(_) => item_result(&target, id, 200, None),
                    None => item_result(&target, id, 404, Some("not_found")),
                },
            };
            results.push(result);
        }

        Ok(BatchOperationSummary::from_results(results))
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchIndexError> {
        let mut state = self.state();
        let target = state.resolve_write(index)?;
        if let Some(index) = state.indices.get_mut(&target) {
            index.documents.remove(id);
        }
        Ok(())
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchHits, SearchIndexError> {
        let state = self.state();
        let mut targets = BTreeSet::new();
        for name in index.split(',') {
            let resolved = state.resolve(name);
            if resolved.is_empty() {
                return Err(SearchIndexError::index_not_found(name));
            }
            targets.extend(resolved);
        }

        let candidates = targets
            .iter()
            .filter_map(|name| state.indices.get_key_value(name))
            .flat_map(|(name, index)| {
                index.documents.iter().map(move |(id, source)| Candidate {
                    index: name,
                    id,
                    source,
                })
            })
            .collect();

        let execution = query_eval::execute(body, candidates)?;

        Ok(SearchHits {
            total: execution.total,
            hits: execution
                .page
                .into_iter()
                .map(|hit| SearchHit {
                    index: hit.candidate.index.to_string(),
                    id: hit.candidate.id.to_string(),
                    score: Some(hit.score),
                    source: hit.candidate.source.clone(),
                })
                .collect(),
            aggregations: execution.aggregations,
        })
    }

    async fn refresh(&self, index: &str) -> Result<(), SearchIndexError> {
        if self.state().resolve(index).is_empty() {
            return Err(SearchIndexError::index_not_found(index));
        }
        Ok(())
    }
}
