//! Search request body construction.
//!
//! Turns a [`SearchQuery`] into an OpenSearch `_search` body for one entity:
//! the free-text term drives relevance in `query`, field filters go into
//! `post_filter`, and the ordering becomes `sort`. Aggregations run on the
//! `query` matches only, so their counts ignore the filters.
//!
//! A [`BasicSearchQuery`] searches several entities' indices in one request
//! and counts matches per index.

use std::collections::BTreeMap;

use search_sync_shared::{BasicSearchQuery, IndexMapping, SearchQuery};
use serde_json::{json, Map, Value};

/// Sort field remappings: text fields are sorted on their keyword sub-field.
const SORT_FIELD_REMAPPING: &[(&str, &str)] = &[("name", "name.keyword")];

/// Field used to promote exact name matches.
const NAME_KEYWORD_FIELD: &str = "name.keyword";

/// Filter pseudo-fields that hold no values to aggregate.
const NON_AGGREGATABLE_SUFFIXES: &[&str] = &["_before", "_after", "_trigram", "_exists"];

/// Aggregation of a basic search counting matches per index.
pub const COUNT_BY_INDEX: &str = "count_by_index";

/// Upper bound on the indices a basic search counts.
const MAX_COUNTED_INDICES: usize = 100;

/// Builds search bodies for one entity.
///
/// # Example
///
/// ```
/// use search_sync_repository::queries::SearchQueryBuilder;
/// use search_sync_shared::{FieldMapping, IndexMapping, SearchQuery};
///
/// let mapping = IndexMapping::new().field("name", FieldMapping::name_text());
/// let fields = vec!["name".to_string(), "name.trigram".to_string()];
///
/// let body = SearchQueryBuilder::new(&mapping)
///     .with_search_fields(&fields)
///     .build(&SearchQuery::new("acme").with_filter("archived", false));
///
/// assert!(body["post_filter"].is_object());
/// ```
#[derive(Debug, Clone)]
pub struct SearchQueryBuilder<'a> {
    mapping: &'a IndexMapping,
    search_fields: &'a [String],
    composite_filters: Option<&'a BTreeMap<String, Vec<String>>>,
}

impl<'a> SearchQueryBuilder<'a> {
    pub fn new(mapping: &'a IndexMapping) -> Self {
        Self {
            mapping,
            search_fields: &[],
            composite_filters: None,
        }
    }

    /// Fields searched by the free-text term.
    pub fn with_search_fields(mut self, fields: &'a [String]) -> Self {
        self.search_fields = fields;
        self
    }

    /// Filters that match when any of several underlying fields match.
    pub fn with_composite_filters(mut self, filters: &'a BTreeMap<String, Vec<String>>) -> Self {
        self.composite_filters = Some(filters);
        self
    }

    /// Build the complete `_search` request body.
    pub fn build(&self, query: &SearchQuery) -> Value {
        let mut body = Map::new();
        body.insert(
            "query".to_string(),
            term_query(&query.term, self.search_fields),
        );

        let must = self.must_queries(&query.filters);
        if !must.is_empty() {
            body.insert("post_filter".to_string(), json!({"bool": {"must": must}}));
        }

        if let Some(aggs) = self.aggregations(&query.aggregations) {
            body.insert("aggs".to_string(), aggs);
        }

        body.insert("sort".to_string(), self.sort(query.ordering.as_deref()));
        body.insert("from".to_string(), json!(query.offset));
        body.insert("size".to_string(), json!(query.clipped_limit()));
        body.insert("track_total_hits".to_string(), json!(true));

        Value::Object(body)
    }

    /// Build the body of a basic search spanning several entities.
    ///
    /// `included_indices` are the indices of the selected entities; only
    /// their documents are returned, but [`COUNT_BY_INDEX`] counts the
    /// matches of every searched index.
    pub fn build_basic(&self, query: &BasicSearchQuery, included_indices: &[String]) -> Value {
        json!({
            "query": term_query(&query.term, self.search_fields),
            "post_filter": {"terms": {"_index": included_indices}},
            "aggs": {
                COUNT_BY_INDEX: {"terms": {"field": "_index", "size": MAX_COUNTED_INDICES}}
            },
            "sort": self.sort(query.ordering.as_deref()),
            "from": query.offset,
            "size": query.clipped_limit(),
            "track_total_hits": true,
        })
    }

    /// Terms aggregations keyed by field. Fields inside nested objects count
    /// their values in a nested bucket.
    fn aggregations(&self, fields: &[String]) -> Option<Value> {
        let mut aggs = Map::new();
        for field in fields {
            if NON_AGGREGATABLE_SUFFIXES
                .iter()
                .any(|suffix| field.ends_with(suffix))
            {
                continue;
            }

            let terms = json!({"terms": {"field": field}});
            let agg = match self.mapping.nested_path_of(field) {
                Some(path) => json!({
                    "nested": {"path": path},
                    "aggs": {field.as_str(): terms}
                }),
                None => terms,
            };
            aggs.insert(field.clone(), agg);
        }

        (!aggs.is_empty()).then_some(Value::Object(aggs))
    }

    /// Every query a matching document must satisfy, one per filter key plus
    /// one per date range.
    fn must_queries(&self, filters: &BTreeMap<String, Value>) -> Vec<Value> {
        let (filters, ranges) = split_range_filters(filters);

        let mut must = Vec::with_capacity(filters.len() + ranges.len());
        for (field, value) in &filters {
            let composite = self
                .composite_filters
                .and_then(|composite| composite.get(field.as_str()));

            let should = match (composite, value) {
                (Some(fields), _) => fields
                    .iter()
                    .map(|composite_field| self.field_query(composite_field, value))
                    .collect(),
                (None, Value::Object(sub_filters)) => self.nested_queries(field, sub_filters),
                _ => Vec::new(),
            };

            if should.is_empty() {
                must.push(self.field_query(field, value));
            } else {
                must.push(any_of(should));
            }
        }

        must.extend(range_queries(ranges));
        must
    }

    /// Sub-filters of a related object, flattened to `<field>_<sub_field>`.
    fn nested_queries(&self, field: &str, sub_filters: &Map<String, Value>) -> Vec<Value> {
        let normalised: BTreeMap<String, Value> = sub_filters
            .iter()
            .map(|(sub_field, value)| (format!("{}_{}", field, sub_field), value.clone()))
            .collect();

        let (filters, ranges) = split_range_filters(&normalised);
        filters
            .iter()
            .map(|(field, value)| self.field_query(field, value))
            .chain(range_queries(ranges))
            .collect()
    }

    /// Query for one filter value; a list of values matches any of them.
    fn field_query(&self, field: &str, value: &Value) -> Value {
        match value {
            Value::Array(values) => any_of(
                values
                    .iter()
                    .map(|single| self.single_field_query(field, single))
                    .collect(),
            ),
            _ => self.single_field_query(field, value),
        }
    }

    fn single_field_query(&self, field: &str, value: &Value) -> Value {
        let (field, value) = if value.is_null() {
            let field = if field.ends_with("_exists") {
                field.to_string()
            } else {
                let parent = field.rsplit_once('.').map_or(field, |(parent, _)| parent);
                format!("{}_exists", parent)
            };
            (field, Value::Bool(false))
        } else {
            (field.to_string(), value.clone())
        };

        let query = if field.ends_with(".id") || field.ends_with("_keyword") {
            json!({"match_phrase": {field.as_str(): value}})
        } else if field.ends_with("_exists") {
            exists_query(&field, &value)
        } else {
            json!({"match": {field.as_str(): {"query": value, "operator": "and"}}})
        };

        match self.mapping.nested_path_of(&field) {
            Some(path) => json!({"nested": {"path": path, "query": query}}),
            None => query,
        }
    }

    fn sort(&self, ordering: Option<&str>) -> Value {
        let Some(ordering) = ordering else {
            return json!(["_score", "id"]);
        };

        let (field_name, order) = match ordering.rsplit_once(':') {
            Some((field, "desc")) => (field, "desc"),
            Some((field, _)) => (field, "asc"),
            None => (ordering, "asc"),
        };

        let mut params = Map::new();
        params.insert("order".to_string(), json!(order));
        params.insert(
            "missing".to_string(),
            json!(if order == "asc" { "_first" } else { "_last" }),
        );
        if let Some(path) = self.mapping.nested_path_of(field_name) {
            params.insert("nested".to_string(), json!({"path": path}));
        }

        let field_name = SORT_FIELD_REMAPPING
            .iter()
            .find(|(from, _)| *from == field_name)
            .map_or(field_name, |(_, to)| *to);

        json!([{field_name: params}, "id"])
    }
}

/// The relevance query for a free-text term.
///
/// An empty term matches every document. Otherwise a document matches if its
/// name is exactly the term (boosted), its id is the term, or every word of the
/// term appears across the search fields.
pub fn term_query(term: &str, fields: &[String]) -> Value {
    if term.is_empty() {
        return json!({"match_all": {}});
    }

    json!({
        "bool": {
            "should": [
                {"match_phrase": {NAME_KEYWORD_FIELD: {"query": term, "boost": 2}}},
                {"match_phrase": {"id": term}},
                {
                    "multi_match": {
                        "query": term,
                        "fields": fields,
                        "type": "cross_fields",
                        "operator": "and"
                    }
                }
            ]
        }
    })
}

/// Separate `<field>_before` / `<field>_after` keys into per-field range
/// bounds, leaving every other filter untouched.
fn split_range_filters(
    filters: &BTreeMap<String, Value>,
) -> (BTreeMap<String, Value>, BTreeMap<String, Map<String, Value>>) {
    let mut plain = BTreeMap::new();
    let mut ranges: BTreeMap<String, Map<String, Value>> = BTreeMap::new();

    for (key, value) in filters {
        let bound = if key.ends_with("_before") {
            "lte"
        } else if key.ends_with("_after") {
            "gte"
        } else {
            plain.insert(key.clone(), value.clone());
            continue;
        };

        let range_key = key.rsplit_once('_').map_or(key.as_str(), |(field, _)| field);
        ranges
            .entry(range_key.to_string())
            .or_default()
            .insert(bound.to_string(), value.clone());
    }

    (plain, ranges)
}

fn range_queries(ranges: BTreeMap<String, Map<String, Value>>) -> impl Iterator<Item = Value> {
    ranges
        .into_iter()
        .map(|(field, bounds)| json!({"range": {field: bounds}}))
}

fn exists_query(field: &str, value: &Value) -> Value {
    let real_field = field.rsplit_once('_').map_or(field, |(field, _)| field);
    let kind = if is_truthy(value) { "must" } else { "must_not" };
    json!({"bool": {kind: {"exists": {"field": real_field}}}})
}

fn any_of(should: Vec<Value>) -> Value {
    json!({"bool": {"should": should, "minimum_should_match": 1}})
}

/// Filter values arrive from query strings as often as from JSON bodies.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !matches!(s.to_ascii_lowercase().as_str(), "" | "false" | "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_sync_shared::FieldMapping;

    fn mapping() -> IndexMapping {
        IndexMapping::new()
            .field("id", FieldMapping::keyword())
            .field("name", FieldMapping::name_text())
            .field("archived", FieldMapping::boolean())
            .field("created_on", FieldMapping::date())
            .field(
                "sector",
                FieldMapping::object([("id", FieldMapping::keyword())]),
            )
            .field(
                "contacts",
                FieldMapping::nested([
                    ("id", FieldMapping::keyword()),
                    ("name", FieldMapping::sortable_text()),
                ]),
            )
    }

    fn fields() -> Vec<String> {
        vec!["name".to_string(), "name.trigram".to_string()]
    }

    #[test]
    fn test_empty_term_matches_all() {
        assert_eq!(term_query("", &fields()), json!({"match_all": {}}));
    }

    #[test]
    fn test_term_query_structure() {
        let query = term_query("acme", &fields());
        let should = query["bool"]["should"].as_array().unwrap();

        assert_eq!(should.len(), 3);
        assert_eq!(
            should[0],
            json!({"match_phrase": {"name.keyword": {"query": "acme", "boost": 2}}})
        );
        assert_eq!(should[1], json!({"match_phrase": {"id": "acme"}}));
        assert_eq!(should[2]["multi_match"]["type"], "cross_fields");
        assert_eq!(should[2]["multi_match"]["operator"], "and");
        assert_eq!(should[2]["multi_match"]["fields"], json!(["name", "name.trigram"]));
    }

    #[test]
    fn test_no_filters_no_post_filter() {
        let mapping = mapping();
        let body = SearchQueryBuilder::new(&mapping).build(&SearchQuery::new(""));

        assert!(body.get("post_filter").is_none());
        assert_eq!(body["sort"], json!(["_score", "id"]));
        assert_eq!(body["from"], 0);
        assert_eq!(body["size"], 100);
        assert_eq!(body["track_total_hits"], true);
    }

    #[test]
    fn test_plain_and_keyword_filters() {
        let mapping = mapping();
        let body = SearchQueryBuilder::new(&mapping).build(
            &SearchQuery::new("")
                .with_filter("archived", false)
                .with_filter("sector.id", "abc")
                .with_filter("name_keyword", "Acme"),
        );

        let must = body["post_filter"]["bool"]["must"].as_array().unwrap();
        assert_eq!(
            must,
            &vec![
                json!({"match": {"archived": {"query": false, "operator": "and"}}}),
                json!({"match_phrase": {"name_keyword": "Acme"}}),
                json!({"match_phrase": {"sector.id": "abc"}}),
            ]
        );
    }

    #[test]
    fn test_nested_field_filter_is_wrapped() {
        let mapping = mapping();
        let body = SearchQueryBuilder::new(&mapping)
            .build(&SearchQuery::new("").with_filter("contacts.id", "c1"));

        assert_eq!(
            body["post_filter"]["bool"]["must"][0],
            json!({"nested": {"path": "contacts", "query": {"match_phrase": {"contacts.id": "c1"}}}})
        );
    }

    #[test]
    fn test_list_filter_matches_any() {
        let mapping = mapping();
        let body = SearchQueryBuilder::new(&mapping)
            .build(&SearchQuery::new("").with_filter("sector.id", json!(["a", "b"])));

        assert_eq!(
            body["post_filter"]["bool"]["must"][0],
            json!({"bool": {
                "should": [
                    {"match_phrase": {"sector.id": "a"}},
                    {"match_phrase": {"sector.id": "b"}}
                ],
                "minimum_should_match": 1
            }})
        );
    }

    #[test]
    fn test_null_filter_becomes_missing_parent() {
        let mapping = mapping();
        let body = SearchQueryBuilder::new(&mapping)
            .build(&SearchQuery::new("").with_filter("sector.id", Value::Null));

        assert_eq!(
            body["post_filter"]["bool"]["must"][0],
            json!({"bool": {"must_not": {"exists": {"field": "sector"}}}})
        );
    }

    #[test]
    fn test_exists_filter() {
        let mapping = mapping();
        let body = SearchQueryBuilder::new(&mapping)
            .build(&SearchQuery::new("").with_filter("archived_exists", true));

        assert_eq!(
            body["post_filter"]["bool"]["must"][0],
            json!({"bool": {"must": {"exists": {"field": "archived"}}}})
        );
    }

    #[test]
    fn test_range_filters() {
        let mapping = mapping();
        let body = SearchQueryBuilder::new(&mapping).build(
            &SearchQuery::new("")
                .with_filter("created_on_after", "2020-01-01")
                .with_filter("created_on_before", "2020-12-31"),
        );

        let must = body["post_filter"]["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 1);
        assert_eq!(
            must[0],
            json!({"range": {"created_on": {"gte": "2020-01-01", "lte": "2020-12-31"}}})
        );
    }

    #[test]
    fn test_object_filter_becomes_sub_filters() {
        let mapping = mapping();
        let body = SearchQueryBuilder::new(&mapping).build(
            &SearchQuery::new("").with_filter("address", json!({"postcode": "SW1", "town": "London"})),
        );

        let clause = &body["post_filter"]["bool"]["must"][0]["bool"];
        assert_eq!(clause["minimum_should_match"], 1);
        assert_eq!(
            clause["should"],
            json!([
                {"match": {"address_postcode": {"query": "SW1", "operator": "and"}}},
                {"match": {"address_town": {"query": "London", "operator": "and"}}}
            ])
        );
    }

    #[test]
    fn test_composite_filter_ors_fields() {
        let mapping = mapping();
        let composite = BTreeMap::from([(
            "uk_postcode".to_string(),
            vec!["address_postcode".to_string(), "registered_address_postcode".to_string()],
        )]);

        let body = SearchQueryBuilder::new(&mapping)
            .with_composite_filters(&composite)
            .build(&SearchQuery::new("").with_filter("uk_postcode", "SW1"));

        let should = body["post_filter"]["bool"]["must"][0]["bool"]["should"]
            .as_array()
            .unwrap();
        assert_eq!(should.len(), 2);
        assert_eq!(
            should[1],
            json!({"match": {"registered_address_postcode": {"query": "SW1", "operator": "and"}}})
        );
    }

    #[test]
    fn test_ordering() {
        let mapping = mapping();
        let builder = SearchQueryBuilder::new(&mapping);

        let body = builder.build(&SearchQuery::new("").with_ordering("name"));
        assert_eq!(
            body["sort"],
            json!([{"name.keyword": {"order": "asc", "missing": "_first"}}, "id"])
        );

        let body = builder.build(&SearchQuery::new("").with_ordering("created_on:desc"));
        assert_eq!(
            body["sort"],
            json!([{"created_on": {"order": "desc", "missing": "_last"}}, "id"])
        );

        let body = builder.build(&SearchQuery::new("").with_ordering("contacts.name:asc"));
        assert_eq!(
            body["sort"],
            json!([{"contacts.name": {
                "order": "asc",
                "missing": "_first",
                "nested": {"path": "contacts"}
            }}, "id"])
        );
    }

    #[test]
    fn test_aggregations() {
        let mapping = mapping();
        let body = SearchQueryBuilder::new(&mapping).build(
            &SearchQuery::new("")
                .with_filter("archived", false)
                .with_aggregation("archived")
                .with_aggregation("contacts.id")
                .with_aggregation("sector.id")
                .with_aggregation("created_on_after")
                .with_aggregation("name_trigram")
                .with_aggregation("archived_exists"),
        );

        assert_eq!(
            body["aggs"],
            json!({
                "archived": {"terms": {"field": "archived"}},
                "contacts.id": {
                    "nested": {"path": "contacts"},
                    "aggs": {"contacts.id": {"terms": {"field": "contacts.id"}}}
                },
                "sector.id": {"terms": {"field": "sector.id"}}
            })
        );
        assert!(body["post_filter"].is_object());
    }

    #[test]
    fn test_no_aggregations_without_aggregatable_fields() {
        let mapping = mapping();
        let body = SearchQueryBuilder::new(&mapping)
            .build(&SearchQuery::new("").with_aggregation("created_on_before"));

        assert!(body.get("aggs").is_none());
    }

    #[test]
    fn test_basic_search_body() {
        let mapping = IndexMapping::new();
        let fields = fields();
        let included = vec!["test-company-abc".to_string()];

        let body = SearchQueryBuilder::new(&mapping)
            .with_search_fields(&fields)
            .build_basic(&BasicSearchQuery::new("acme").with_limit(20), &included);

        assert_eq!(body["query"], term_query("acme", &fields));
        assert_eq!(
            body["post_filter"],
            json!({"terms": {"_index": ["test-company-abc"]}})
        );
        assert_eq!(body["aggs"][COUNT_BY_INDEX]["terms"]["field"], "_index");
        assert_eq!(body["sort"], json!(["_score", "id"]));
        assert_eq!(body["size"], 20);
    }

    #[test]
    fn test_page_is_clipped() {
        let mapping = mapping();
        let body = SearchQueryBuilder::new(&mapping)
            .build(&SearchQuery::new("").with_offset(9_990).with_limit(50));

        assert_eq!(body["from"], 9_990);
        assert_eq!(body["size"], 10);
    }
}
