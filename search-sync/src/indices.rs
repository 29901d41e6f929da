//! Index and alias management.
//!
//! Every app owns physical indices named `<prefix>-<app>-<mapping hash>` and two
//! aliases: `<prefix>-<app>-read`, which searches go through and which may span
//! several indices during a migration, and `<prefix>-<app>-write`, which always
//! references exactly one index. The write index must be one of the read
//! indices.

use std::collections::BTreeSet;
use std::sync::Arc;

use search_sync_repository::{AliasAction, SearchIndexError, SearchIndexProvider};
use search_sync_shared::IndexMapping;
use tracing::{debug, info, instrument, warn};

use crate::apps::SearchApp;
use crate::errors::SearchSyncError;

/// Builds index and alias names from the configured prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNaming {
    prefix: String,
}

impl IndexNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Physical index holding `app` documents laid out with the mapping of
    /// the given hash.
    pub fn index_name(&self, app: &str, mapping_hash: &str) -> String {
        format!("{}-{}-{}", self.prefix, app, mapping_hash)
    }

    pub fn read_alias(&self, app: &str) -> String {
        format!("{}-{}-read", self.prefix, app)
    }

    pub fn write_alias(&self, app: &str) -> String {
        format!("{}-{}-write", self.prefix, app)
    }

    /// Wildcard matching every index under the prefix.
    pub fn index_pattern(&self) -> String {
        format!("{}-*", self.prefix)
    }

    /// Mapping hash suffix of a physical index name.
    pub fn hash_from_index_name(index: &str) -> Option<&str> {
        index
            .rsplit_once('-')
            .map(|(_, hash)| hash)
            .filter(|hash| !hash.is_empty())
    }
}

/// Index and alias operations for search apps.
#[derive(Clone)]
pub struct IndexManager {
    provider: Arc<dyn SearchIndexProvider>,
    naming: IndexNaming,
}

impl IndexManager {
    pub fn new(provider: Arc<dyn SearchIndexProvider>, naming: IndexNaming) -> Self {
        Self { provider, naming }
    }

    pub fn naming(&self) -> &IndexNaming {
        &self.naming
    }

    pub fn provider(&self) -> &Arc<dyn SearchIndexProvider> {
        &self.provider
    }

    /// Create an index unless one of that name already exists.
    ///
    /// Index names embed the mapping hash, so an existing index already has
    /// the requested layout. Returns whether the index was created.
    #[instrument(skip(self, mapping, aliases))]
    pub async fn create_index(
        &self,
        index: &str,
        mapping: &IndexMapping,
        aliases: &[String],
    ) -> Result<bool, SearchSyncError> {
        if self.provider.index_exists(index).await? {
            debug!(index, "Index already exists");
            return Ok(false);
        }

        self.provider.create_index(index, mapping, aliases).await?;
        info!(index, aliases = ?aliases, "Created index");
        Ok(true)
    }

    /// Resolve the read alias and the write alias of an app.
    ///
    /// # Returns
    ///
    /// * `Ok((read_indices, write_index))`
    /// * `Err(SearchSyncError::NotInitialised)` - If either alias is missing or
    ///   the write alias does not reference exactly one index
    /// * `Err(SearchSyncError::Consistency)` - If the write index is not one of
    ///   the read indices
    pub async fn get_read_and_write_indices(
        &self,
        app: &SearchApp,
    ) -> Result<(BTreeSet<String>, String), SearchSyncError> {
        let read_alias = self.naming.read_alias(&app.name);
        let write_alias = self.naming.write_alias(&app.name);

        let read_indices = self.provider.get_indices_for_alias(&read_alias).await?;
        let write_indices = self.provider.get_indices_for_alias(&write_alias).await?;

        if read_indices.is_empty() {
            return Err(SearchSyncError::not_initialised(
                &app.name,
                format!("alias {} does not exist", read_alias),
            ));
        }

        let mut write_indices = write_indices.into_iter();
        let write_index = match (write_indices.next(), write_indices.next()) {
            (Some(index), None) => index,
            (None, _) => {
                return Err(SearchSyncError::not_initialised(
                    &app.name,
                    format!("alias {} does not exist", write_alias),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(SearchSyncError::not_initialised(
                    &app.name,
                    format!("alias {} references more than one index", write_alias),
                ))
            }
        };

        if !read_indices.contains(&write_index) {
            return Err(SearchSyncError::Consistency {
                app: app.name.clone(),
                write_index,
                read_indices,
            });
        }

        Ok((read_indices, write_index))
    }

    /// Start collecting alias changes to apply in one request.
    pub fn start_alias_transaction(&self) -> AliasTransaction<'_> {
        AliasTransaction {
            provider: self.provider.as_ref(),
            actions: Vec::new(),
        }
    }

    /// Hash of the mapping the app's documents should be laid out with.
    pub fn get_target_mapping_hash(&self, app: &SearchApp) -> String {
        app.mapping.mapping_hash()
    }

    /// Hash of the mapping of the current write index.
    pub async fn get_current_mapping_hash(&self, app: &SearchApp) -> Result<String, SearchSyncError> {
        let (_, write_index) = self.get_read_and_write_indices(app).await?;
        IndexNaming::hash_from_index_name(&write_index)
            .map(str::to_string)
            .ok_or_else(|| {
                SearchSyncError::not_initialised(
                    &app.name,
                    format!("write index {} has no mapping hash suffix", write_index),
                )
            })
    }

    /// Name of the index matching the app's current mapping.
    pub fn target_index_name(&self, app: &SearchApp) -> String {
        self.naming
            .index_name(&app.name, &self.get_target_mapping_hash(app))
    }

    /// Create the app's first index and both aliases if the aliases do not
    /// exist yet.
    ///
    /// Only missing aliases are attached. A write alias left pointing at
    /// other indices while the read alias is missing is moved to the target
    /// index in the same alias transaction, so the write alias never
    /// references more than one index.
    ///
    /// Returns `true` if anything was changed. Apps that already have both
    /// aliases are left untouched.
    #[instrument(skip(self, app), fields(app = %app.name))]
    pub async fn set_up_index_and_aliases(&self, app: &SearchApp) -> Result<bool, SearchSyncError> {
        let read_alias = self.naming.read_alias(&app.name);
        let write_alias = self.naming.write_alias(&app.name);

        let read_indices = self.provider.get_indices_for_alias(&read_alias).await?;
        let write_indices = self.provider.get_indices_for_alias(&write_alias).await?;
        if !read_indices.is_empty() && !write_indices.is_empty() {
            return Ok(false);
        }

        let index = self.target_index_name(app);
        if read_indices.is_empty() && write_indices.is_empty() {
            let created = self
                .create_index(&index, &app.mapping, &[read_alias.clone(), write_alias.clone()])
                .await?;
            if created {
                info!(index = %index, "Set up index and aliases");
                return Ok(true);
            }
        } else {
            self.create_index(&index, &app.mapping, &[]).await?;
        }

        let stale_write: Vec<String> = write_indices
            .iter()
            .filter(|name| **name != index)
            .cloned()
            .collect();
        warn!(
            index = %index,
            read_indices = ?read_indices,
            write_indices = ?write_indices,
            "Repairing partially set up aliases"
        );

        let mut transaction = self.start_alias_transaction();
        if !read_indices.contains(&index) {
            transaction.associate_indices_with_alias(&read_alias, [index.clone()]);
        }
        if !write_indices.contains(&index) {
            transaction.associate_indices_with_alias(&write_alias, [index.clone()]);
        }
        transaction.dissociate_indices_from_alias(&write_alias, stale_write.iter().cloned());
        transaction.commit().await?;

        if !stale_write.is_empty() {
            warn!(
                index = %index,
                stale_indices = ?stale_write,
                "Moved write alias off stale indices"
            );
        }

        info!(index = %index, "Set up index and aliases");
        Ok(true)
    }

    pub async fn get_aliases_for_index(&self, index: &str) -> Result<BTreeSet<String>, SearchSyncError> {
        Ok(self.provider.get_aliases_for_index(index).await?)
    }

    pub async fn delete_index(&self, index: &str) -> Result<(), SearchSyncError> {
        self.provider.delete_index(index).await?;
        info!(index, "Deleted index");
        Ok(())
    }

    /// Delete every index under the prefix. Returns the deleted index names.
    #[instrument(skip(self), fields(prefix = %self.naming.prefix()))]
    pub async fn delete_all_indices(&self) -> Result<Vec<String>, SearchSyncError> {
        let indices = self
            .provider
            .list_indices(&self.naming.index_pattern())
            .await?;

        let mut deleted = Vec::with_capacity(indices.len());
        for index in indices {
            match self.provider.delete_index(&index).await {
                Ok(()) => {
                    info!(index = %index, "Deleted index");
                    deleted.push(index);
                }
                Err(SearchIndexError::IndexNotFound(_)) => {
                    debug!(index = %index, "Index already gone");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(deleted)
    }
}

/// Alias changes applied together in one atomic request.
#[must_use = "alias changes are only applied by commit()"]
pub struct AliasTransaction<'a> {
    provider: &'a dyn SearchIndexProvider,
    actions: Vec<AliasAction>,
}

impl AliasTransaction<'_> {
    pub fn associate_indices_with_alias(
        &mut self,
        alias: &str,
        indices: impl IntoIterator<Item = String>,
    ) -> &mut Self {
        let indices: Vec<String> = indices.into_iter().collect();
        if !indices.is_empty() {
            self.actions.push(AliasAction::Add {
                alias: alias.to_string(),
                indices,
            });
        }
        self
    }

    pub fn dissociate_indices_from_alias(
        &mut self,
        alias: &str,
        indices: impl IntoIterator<Item = String>,
    ) -> &mut Self {
        let indices: Vec<String> = indices.into_iter().collect();
        if !indices.is_empty() {
            self.actions.push(AliasAction::Remove {
                alias: alias.to_string(),
                indices,
            });
        }
        self
    }

    pub fn actions(&self) -> &[AliasAction] {
        &self.actions
    }

    /// Submit every collected action as one request.
    pub async fn commit(self) -> Result<(), SearchSyncError> {
        if self.actions.is_empty() {
            return Ok(());
        }
        self.provider.update_aliases(&self.actions).await?;
        debug!(actions = ?self.actions, "Committed alias transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_sync_repository::memory::{InMemoryRowSource, InMemorySearchProvider};
    use search_sync_shared::FieldMapping;

    fn app() -> SearchApp {
        SearchApp::new(
            "widget",
            Arc::new(InMemoryRowSource::new()),
            IndexMapping::new().field("name", FieldMapping::name_text()),
            |_| serde_json::Map::new(),
        )
    }

    fn manager(provider: &Arc<InMemorySearchProvider>) -> IndexManager {
        IndexManager::new(provider.clone(), IndexNaming::new("test"))
    }

    #[test]
    fn test_naming() {
        let naming = IndexNaming::new("search");
        assert_eq!(naming.index_name("company", "abc"), "search-company-abc");
        assert_eq!(naming.read_alias("company"), "search-company-read");
        assert_eq!(naming.write_alias("company"), "search-company-write");
        assert_eq!(naming.index_pattern(), "search-*");
        assert_eq!(
            IndexNaming::hash_from_index_name("search-large-capital-abc123"),
            Some("abc123")
        );
        assert_eq!(IndexNaming::hash_from_index_name("nohyphen"), None);
    }

    #[tokio::test]
    async fn test_create_index_is_idempotent() {
        let provider = Arc::new(InMemorySearchProvider::new());
        let manager = manager(&provider);
        let mapping = app().mapping;

        assert!(manager.create_index("test-widget-a", &mapping, &[]).await.unwrap());
        assert!(!manager.create_index("test-widget-a", &mapping, &[]).await.unwrap());
        assert_eq!(provider.created_indices(), vec!["test-widget-a"]);
    }

    #[tokio::test]
    async fn test_set_up_index_and_aliases() {
        let provider = Arc::new(InMemorySearchProvider::new());
        let manager = manager(&provider);
        let app = app();

        assert!(manager.set_up_index_and_aliases(&app).await.unwrap());
        assert!(!manager.set_up_index_and_aliases(&app).await.unwrap());

        let expected = manager.target_index_name(&app);
        let (read, write) = manager.get_read_and_write_indices(&app).await.unwrap();
        assert_eq!(read, BTreeSet::from([expected.clone()]));
        assert_eq!(write, expected);
        assert_eq!(
            manager.get_current_mapping_hash(&app).await.unwrap(),
            manager.get_target_mapping_hash(&app)
        );
    }

    #[tokio::test]
    async fn test_set_up_repairs_missing_alias() {
        let provider = Arc::new(InMemorySearchProvider::new());
        let manager = manager(&provider);
        let app = app();
        let index = manager.target_index_name(&app);
        provider
            .create_index(&index, &app.mapping, &["test-widget-read".to_string()])
            .await
            .unwrap();

        assert!(manager.set_up_index_and_aliases(&app).await.unwrap());
        let (_, write) = manager.get_read_and_write_indices(&app).await.unwrap();
        assert_eq!(write, index);
    }

    #[tokio::test]
    async fn test_set_up_moves_stale_write_alias() {
        let provider = Arc::new(InMemorySearchProvider::new());
        let manager = manager(&provider);
        let app = app();
        provider
            .create_index("test-widget-old", &app.mapping, &["test-widget-write".to_string()])
            .await
            .unwrap();
        let index = manager.target_index_name(&app);

        assert!(manager.set_up_index_and_aliases(&app).await.unwrap());

        let (read, write) = manager.get_read_and_write_indices(&app).await.unwrap();
        assert_eq!(read, BTreeSet::from([index.clone()]));
        assert_eq!(write, index);
        assert_eq!(provider.alias_updates().len(), 1);
        assert!(provider
            .get_aliases_for_index("test-widget-old")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_set_up_keeps_existing_read_alias() {
        let provider = Arc::new(InMemorySearchProvider::new());
        let manager = manager(&provider);
        let app = app();
        provider
            .create_index("test-widget-old", &app.mapping, &["test-widget-read".to_string()])
            .await
            .unwrap();
        let index = manager.target_index_name(&app);

        assert!(manager.set_up_index_and_aliases(&app).await.unwrap());

        let (read, write) = manager.get_read_and_write_indices(&app).await.unwrap();
        assert_eq!(
            read,
            BTreeSet::from(["test-widget-old".to_string(), index.clone()])
        );
        assert_eq!(write, index);
    }

    #[tokio::test]
    async fn test_uninitialised_app() {
        let provider = Arc::new(InMemorySearchProvider::new());
        let manager = manager(&provider);

        let err = manager.get_read_and_write_indices(&app()).await.unwrap_err();
        assert!(matches!(err, SearchSyncError::NotInitialised { .. }));
    }

    #[tokio::test]
    async fn test_write_index_outside_read_alias() {
        let provider = Arc::new(InMemorySearchProvider::new());
        let manager = manager(&provider);
        let mapping = app().mapping;
        provider
            .create_index("test-widget-a", &mapping, &["test-widget-read".to_string()])
            .await
            .unwrap();
        provider
            .create_index("test-widget-b", &mapping, &["test-widget-write".to_string()])
            .await
            .unwrap();

        let err = manager.get_read_and_write_indices(&app()).await.unwrap_err();
        match err {
            SearchSyncError::Consistency {
                write_index,
                read_indices,
                ..
            } => {
                assert_eq!(write_index, "test-widget-b");
                assert_eq!(read_indices, BTreeSet::from(["test-widget-a".to_string()]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_alias_transaction_is_one_request() {
        let provider = Arc::new(InMemorySearchProvider::new());
        let manager = manager(&provider);
        let mapping = app().mapping;
        for index in ["test-widget-a", "test-widget-b"] {
            provider.create_index(index, &mapping, &[]).await.unwrap();
        }

        let mut transaction = manager.start_alias_transaction();
        transaction
            .associate_indices_with_alias("test-widget-read", ["test-widget-a".to_string()])
            .associate_indices_with_alias("test-widget-read", ["test-widget-b".to_string()])
            .dissociate_indices_from_alias("test-widget-write", Vec::new());
        assert_eq!(transaction.actions().len(), 2);
        transaction.commit().await.unwrap();

        assert_eq!(provider.alias_updates().len(), 1);
        assert_eq!(
            provider.get_indices_for_alias("test-widget-read").await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_delete_all_indices() {
        let provider = Arc::new(InMemorySearchProvider::new());
        let manager = manager(&provider);
        let mapping = app().mapping;
        for index in ["test-widget-a", "test-gadget-b", "other-widget-c"] {
            provider.create_index(index, &mapping, &[]).await.unwrap();
        }

        let mut deleted = manager.delete_all_indices().await.unwrap();
        deleted.sort();
        assert_eq!(deleted, vec!["test-gadget-b", "test-widget-a"]);
        assert_eq!(
            provider.index_names(),
            BTreeSet::from(["other-widget-c".to_string()])
        );
    }
}
