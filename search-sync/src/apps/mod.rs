//! Search apps: the binding of one entity type to one document schema.
//!
//! Apps are built once at start-up from the static [`ENTITIES`] list and held
//! in a [`SearchAppRegistry`] that is passed to everything needing them.

pub mod company;
pub mod contact;
pub mod interaction;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use search_sync_repository::postgres::SourceQuery;
use search_sync_repository::RowSource;
use search_sync_shared::{IndexMapping, SourceRow};
use serde_json::{Map, Value};

use crate::config::DEFAULT_BULK_BATCH_SIZE;
use crate::errors::SearchSyncError;

/// Pure conversion of one source row into a document body.
pub type DocumentMapper = fn(&SourceRow) -> Map<String, Value>;

/// One entity type made searchable.
pub struct SearchApp {
    pub name: String,
    pub source: Arc<dyn RowSource>,
    pub mapping: IndexMapping,
    pub mapper: DocumentMapper,
    /// Rows per bulk request when syncing.
    pub bulk_batch_size: usize,
    /// Fields searched by the free-text term.
    pub search_fields: Vec<String>,
    /// Filter names matching any of several document fields.
    pub composite_filters: BTreeMap<String, Vec<String>>,
    pub view_permissions: Vec<String>,
    pub export_permission: Option<String>,
}

impl SearchApp {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn RowSource>,
        mapping: IndexMapping,
        mapper: DocumentMapper,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            mapping,
            mapper,
            bulk_batch_size: DEFAULT_BULK_BATCH_SIZE,
            search_fields: Vec::new(),
            composite_filters: BTreeMap::new(),
            view_permissions: Vec::new(),
            export_permission: None,
        }
    }

    pub fn with_bulk_batch_size(mut self, size: usize) -> Self {
        self.bulk_batch_size = size.max(1);
        self
    }

    pub fn with_search_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_composite_filter<I, S>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.composite_filters
            .insert(name.into(), fields.into_iter().map(Into::into).collect());
        self
    }
}

impl fmt::Debug for SearchApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchApp")
            .field("name", &self.name)
            .field("bulk_batch_size", &self.bulk_batch_size)
            .field("search_fields", &self.search_fields)
            .finish_non_exhaustive()
    }
}

/// Static description of a registered entity.
pub struct EntityDescriptor {
    pub name: &'static str,
    pub mapping: fn() -> IndexMapping,
    pub mapper: DocumentMapper,
    pub source_query: fn() -> SourceQuery,
    pub search_fields: &'static [&'static str],
    pub composite_filters: &'static [(&'static str, &'static [&'static str])],
    pub view_permissions: &'static [&'static str],
    pub export_permission: Option<&'static str>,
}

impl EntityDescriptor {
    /// Build the app reading rows from `source`.
    pub fn build(&self, source: Arc<dyn RowSource>, bulk_batch_size: usize) -> SearchApp {
        let mut app = SearchApp::new(self.name, source, (self.mapping)(), self.mapper)
            .with_bulk_batch_size(bulk_batch_size)
            .with_search_fields(self.search_fields.iter().copied());
        for (name, fields) in self.composite_filters {
            app = app.with_composite_filter(*name, fields.iter().copied());
        }
        app.view_permissions = self.view_permissions.iter().map(|p| p.to_string()).collect();
        app.export_permission = self.export_permission.map(str::to_string);
        app
    }
}

/// Every entity the engine knows about.
pub const ENTITIES: &[EntityDescriptor] = &[
    company::DESCRIPTOR,
    contact::DESCRIPTOR,
    interaction::DESCRIPTOR,
];

/// The set of registered apps, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SearchAppRegistry {
    apps: BTreeMap<String, Arc<SearchApp>>,
}

impl SearchAppRegistry {
    pub fn new(apps: impl IntoIterator<Item = SearchApp>) -> Self {
        Self {
            apps: apps
                .into_iter()
                .map(|app| (app.name.clone(), Arc::new(app)))
                .collect(),
        }
    }

    /// Build every descriptor with the row source returned by `source_for`.
    pub fn from_descriptors<F, E>(
        descriptors: &[EntityDescriptor],
        bulk_batch_size: usize,
        mut source_for: F,
    ) -> Result<Self, E>
    where
        F: FnMut(&EntityDescriptor) -> Result<Arc<dyn RowSource>, E>,
    {
        let mut apps = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            apps.push(descriptor.build(source_for(descriptor)?, bulk_batch_size));
        }
        Ok(Self::new(apps))
    }

    pub fn get(&self, name: &str) -> Result<Arc<SearchApp>, SearchSyncError> {
        self.apps
            .get(name)
            .cloned()
            .ok_or_else(|| SearchSyncError::UnknownApp(name.to_string()))
    }

    pub fn all(&self) -> Vec<Arc<SearchApp>> {
        self.apps.values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.apps.keys().cloned().collect()
    }

    /// The named apps, or every app when `names` is empty.
    pub fn select(&self, names: &[String]) -> Result<Vec<Arc<SearchApp>>, SearchSyncError> {
        if names.is_empty() {
            return Ok(self.all());
        }
        names.iter().map(|name| self.get(name)).collect()
    }
}
