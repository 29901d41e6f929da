//! Shared fixtures for the integration tests: a "widget" app backed by the
//! in-memory backends.

#![allow(dead_code)]

use std::sync::Arc;

use search_sync::apps::{SearchApp, SearchAppRegistry};
use search_sync::indices::IndexNaming;
use search_sync::mapper::copy_columns;
use search_sync::tasks::{QueuedJobScheduler, Worker, WorkerConfig};
use search_sync::SearchContext;
use search_sync_repository::memory::{
    InMemoryAdvisoryLock, InMemoryJobStore, InMemoryRowSource, InMemorySearchProvider,
};
use search_sync_shared::{FieldMapping, IndexMapping, SourceRow};
use serde_json::{json, Map, Value};
use uuid::Uuid;

pub const PREFIX: &str = "test";
pub const APP: &str = "widget";

pub fn widget_mapping() -> IndexMapping {
    IndexMapping::new()
        .field("id", FieldMapping::keyword())
        .field("name", FieldMapping::name_text())
        .field("colour", FieldMapping::keyword())
        .field("weight", FieldMapping::integer())
        .field("archived", FieldMapping::boolean())
}

/// The widget mapping with one field added.
pub fn widget_mapping_v2() -> IndexMapping {
    widget_mapping().field("created_on", FieldMapping::date())
}

pub fn widget_to_document(row: &SourceRow) -> Map<String, Value> {
    let mut document = Map::new();
    copy_columns(row, &mut document, &["name", "colour", "weight", "archived", "created_on"]);
    document
}

pub fn widget_id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

pub fn widget_row(n: u128) -> SourceRow {
    let colour = ["red", "green", "blue"][(n % 3) as usize];
    SourceRow::from_value(
        widget_id(n),
        json!({
            "name": format!("Widget {}", n),
            "colour": colour,
            "weight": (n % 100) as u64,
            "archived": n % 10 == 0,
            "created_on": "2024-01-01T00:00:00Z",
        }),
    )
}

pub fn widget_rows(count: u128) -> Vec<SourceRow> {
    (1..=count).map(widget_row).collect()
}

/// Backends plus an engine context over them.
pub struct Harness {
    pub ctx: SearchContext,
    pub provider: Arc<InMemorySearchProvider>,
    pub source: Arc<InMemoryRowSource>,
    pub jobs: Arc<InMemoryJobStore>,
    pub locks: InMemoryAdvisoryLock,
}

impl Harness {
    /// A widget app with `rows` rows, the v1 mapping and a batch size of 1000.
    pub fn new(rows: Vec<SourceRow>) -> Self {
        let provider = Arc::new(InMemorySearchProvider::new());
        let source = Arc::new(InMemoryRowSource::with_rows(rows));
        let jobs = Arc::new(InMemoryJobStore::new());
        let locks = InMemoryAdvisoryLock::new();
        let ctx = build_context(&provider, &source, &jobs, &locks, widget_mapping());
        Self {
            ctx,
            provider,
            source,
            jobs,
            locks,
        }
    }

    /// The same backends with the widget app on another mapping, as after a
    /// deployment changing the mapping.
    pub fn redeploy(&self, mapping: IndexMapping) -> Self {
        Self {
            ctx: build_context(&self.provider, &self.source, &self.jobs, &self.locks, mapping),
            provider: self.provider.clone(),
            source: self.source.clone(),
            jobs: self.jobs.clone(),
            locks: self.locks.clone(),
        }
    }

    pub fn app(&self) -> Arc<SearchApp> {
        self.ctx.app(APP).unwrap()
    }

    pub fn naming(&self) -> IndexNaming {
        IndexNaming::new(PREFIX)
    }

    pub fn index_for(&self, mapping: &IndexMapping) -> String {
        self.naming().index_name(APP, &mapping.mapping_hash())
    }

    pub fn read_alias(&self) -> String {
        self.naming().read_alias(APP)
    }

    pub fn write_alias(&self) -> String {
        self.naming().write_alias(APP)
    }

    pub fn worker(&self) -> Worker {
        Worker::new(self.ctx.clone(), self.jobs.clone(), WorkerConfig::default())
    }

    /// Run every due job, including jobs scheduled by other jobs.
    pub async fn drain_jobs(&self) -> usize {
        self.worker().run_until_idle().await.unwrap()
    }
}

fn build_context(
    provider: &Arc<InMemorySearchProvider>,
    source: &Arc<InMemoryRowSource>,
    jobs: &Arc<InMemoryJobStore>,
    locks: &InMemoryAdvisoryLock,
    mapping: IndexMapping,
) -> SearchContext {
    let app = SearchApp::new(APP, source.clone(), mapping, widget_to_document)
        .with_bulk_batch_size(1000)
        .with_search_fields(["name", "colour"])
        .with_composite_filter("shade", ["colour", "name"]);

    SearchContext::new(
        provider.clone(),
        IndexNaming::new(PREFIX),
        Arc::new(SearchAppRegistry::new([app])),
        Arc::new(QueuedJobScheduler::new(jobs.clone())),
        Arc::new(locks.clone()),
    )
}
