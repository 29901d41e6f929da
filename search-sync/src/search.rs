//! Querying an app's documents, or every app's at once.

use std::collections::{BTreeMap, BTreeSet};

use search_sync_repository::queries::COUNT_BY_INDEX;
use search_sync_repository::SearchQueryBuilder;
use search_sync_shared::{
    AggregationBucket, BasicSearchPage, BasicSearchQuery, Document, EntityDocument, IndexMapping,
    SearchPage, SearchQuery,
};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::context::SearchContext;
use crate::errors::SearchSyncError;

/// Run a search against the read alias of `app_name`.
///
/// During a migration the read alias spans the old and the new index, so
/// results come from both.
#[instrument(skip(ctx, query), fields(term = %query.term))]
pub async fn search(
    ctx: &SearchContext,
    app_name: &str,
    query: &SearchQuery,
) -> Result<SearchPage, SearchSyncError> {
    let app = ctx.app(app_name)?;
    let body = SearchQueryBuilder::new(&app.mapping)
        .with_search_fields(&app.search_fields)
        .with_composite_filters(&app.composite_filters)
        .build(query);

    let read_alias = ctx.naming().read_alias(&app.name);
    let hits = ctx.provider().search(&read_alias, &body).await?;
    debug!(total = hits.total, returned = hits.hits.len(), "Search complete");

    let aggregations = aggregation_buckets(&hits.aggregations);
    let documents = hits
        .hits
        .into_iter()
        .map(|hit| Document {
            id: hit.id,
            source: hit.source,
        })
        .collect();
    Ok(SearchPage::new(hits.total, documents).with_aggregations(aggregations))
}

/// Search the read aliases of every app in one request.
///
/// The page only holds documents of the apps in `query.entities` (every app
/// when empty); the counts cover every app with at least one match. Apps
/// without a read alias yet are left out.
#[instrument(skip(ctx, query), fields(term = %query.term))]
pub async fn basic_search(
    ctx: &SearchContext,
    query: &BasicSearchQuery,
) -> Result<BasicSearchPage, SearchSyncError> {
    let selected: BTreeSet<String> = ctx
        .registry
        .select(&query.entities)?
        .into_iter()
        .map(|app| app.name.clone())
        .collect();

    let mut app_by_index = BTreeMap::new();
    let mut read_aliases = Vec::new();
    let mut search_fields = BTreeSet::new();
    for app in ctx.registry.all() {
        let read_alias = ctx.naming().read_alias(&app.name);
        let indices = ctx.provider().get_indices_for_alias(&read_alias).await?;
        if indices.is_empty() {
            debug!(app = %app.name, "No read alias, leaving app out of basic search");
            continue;
        }
        for index in indices {
            app_by_index.insert(index, app.name.clone());
        }
        read_aliases.push(read_alias);
        search_fields.extend(app.search_fields.iter().cloned());
    }

    if read_aliases.is_empty() {
        return Ok(BasicSearchPage {
            total: 0,
            results: Vec::new(),
            counts_by_entity: BTreeMap::new(),
        });
    }

    let included: Vec<String> = app_by_index
        .iter()
        .filter(|(_, app)| selected.contains(*app))
        .map(|(index, _)| index.clone())
        .collect();
    let search_fields: Vec<String> = search_fields.into_iter().collect();
    let mapping = IndexMapping::new();
    let body = SearchQueryBuilder::new(&mapping)
        .with_search_fields(&search_fields)
        .build_basic(query, &included);

    let hits = ctx.provider().search(&read_aliases.join(","), &body).await?;
    debug!(total = hits.total, returned = hits.hits.len(), "Basic search complete");

    let mut counts_by_entity = BTreeMap::new();
    if let Some(count_by_index) = hits.aggregations.get(COUNT_BY_INDEX) {
        for bucket in buckets_of(count_by_index) {
            let Some(app) = bucket.key.as_str().and_then(|index| app_by_index.get(index)) else {
                continue;
            };
            *counts_by_entity.entry(app.clone()).or_insert(0) += bucket.doc_count;
        }
    }

    let results = hits
        .hits
        .into_iter()
        .filter_map(|hit| {
            let entity = app_by_index.get(&hit.index)?.clone();
            Some(EntityDocument {
                entity,
                document: Document {
                    id: hit.id,
                    source: hit.source,
                },
            })
        })
        .collect();

    Ok(BasicSearchPage {
        total: hits.total,
        results,
        counts_by_entity,
    })
}

/// Buckets per aggregated field. Fields inside nested objects carry their
/// buckets one level down, under the same name.
fn aggregation_buckets(aggregations: &Map<String, Value>) -> BTreeMap<String, Vec<AggregationBucket>> {
    aggregations
        .iter()
        .map(|(field, agg)| {
            let terms = agg.get(field.as_str()).unwrap_or(agg);
            (field.clone(), buckets_of(terms))
        })
        .collect()
}

fn buckets_of(terms: &Value) -> Vec<AggregationBucket> {
    terms
        .get("buckets")
        .and_then(Value::as_array)
        .map(|buckets| {
            buckets
                .iter()
                .map(|bucket| AggregationBucket {
                    key: bucket.get("key").cloned().unwrap_or(Value::Null),
                    doc_count: bucket.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
                })
                .collect()
        })
        .unwrap_or_default()
}
