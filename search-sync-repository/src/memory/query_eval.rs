//! Evaluation of search request bodies against in-memory documents.
//!
//! Supports the query DSL subset the search API emits: `match_all`,
//! `match_none`, `bool`, `term`, `terms`, `match`, `match_phrase`,
//! `multi_match`, `exists`, `range` and `nested`, plus `sort`, `from`, `size`
//! and `terms` / `nested` aggregations. Text is compared token by token,
//! case-insensitively; keyword sub-fields (`name.keyword`) compare whole
//! values. Every document carries its index name as `_index`.

use std::cmp::Ordering;

use serde_json::{json, Map, Value};

use crate::errors::SearchIndexError;

/// Default page size of a search without `size`.
const DEFAULT_SIZE: usize = 10;

/// Sub-field suffixes that resolve to their parent field in stored sources.
const SUBFIELD_SUFFIXES: &[&str] = &[".keyword", ".trigram"];

/// A stored document visible to a search.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub index: &'a str,
    pub id: &'a str,
    pub source: &'a Map<String, Value>,
}

/// A candidate that matched, with its relevance score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate<'a> {
    pub candidate: Candidate<'a>,
    pub score: f64,
}

/// Outcome of running a `_search` body.
#[derive(Debug, Clone)]
pub struct Execution<'a> {
    /// Matches of `query` and `post_filter`.
    pub total: u64,
    /// The requested page of those matches.
    pub page: Vec<ScoredCandidate<'a>>,
    /// Aggregations over the matches of `query` alone.
    pub aggregations: Map<String, Value>,
}

/// Run a `_search` body over candidates.
pub fn execute<'a>(
    body: &Value,
    candidates: Vec<Candidate<'a>>,
) -> Result<Execution<'a>, SearchIndexError> {
    let query = body.get("query");
    let post_filter = body.get("post_filter");
    let aggs = body.get("aggs").or_else(|| body.get("aggregations"));

    let mut hits = Vec::new();
    let mut query_matches = Vec::new();
    for candidate in candidates {
        let doc = with_index_field(&candidate);
        let score = match query {
            Some(query) => evaluate(query, &doc)?,
            None => Some(1.0),
        };
        let Some(score) = score else { continue };

        let passes = match post_filter {
            Some(filter) => evaluate(filter, &doc)?.is_some(),
            None => true,
        };
        if aggs.is_some() {
            query_matches.push(doc);
        }
        if passes {
            hits.push(ScoredCandidate { candidate, score });
        }
    }

    let aggregations = match aggs {
        Some(aggs) => aggregate(aggs, &query_matches)?,
        None => Map::new(),
    };

    if let Some(sort) = body.get("sort") {
        let keys = sort_keys(sort)?;
        hits.sort_by(|a, b| compare_by_keys(&keys, a, b));
    } else {
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    }

    let total = hits.len() as u64;
    let from = usize_param(body, "from").unwrap_or(0);
    let size = usize_param(body, "size").unwrap_or(DEFAULT_SIZE);

    Ok(Execution {
        total,
        page: hits.into_iter().skip(from).take(size).collect(),
        aggregations,
    })
}

fn with_index_field(candidate: &Candidate<'_>) -> Map<String, Value> {
    let mut doc = candidate.source.clone();
    doc.insert("_index".to_string(), json!(candidate.index));
    doc
}

/// Evaluate an `aggs` object over the documents that matched the query.
fn aggregate(aggs: &Value, docs: &[Map<String, Value>]) -> Result<Map<String, Value>, SearchIndexError> {
    let aggs = aggs
        .as_object()
        .ok_or_else(|| unsupported("aggs must be an object"))?;

    let mut results = Map::new();
    for (name, spec) in aggs {
        let result = if let Some(params) = spec.get("terms") {
            terms_aggregation(params, docs)?
        } else if let Some(params) = spec.get("nested") {
            let path = params
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| unsupported("nested aggregation without path"))?;
            let inner: Vec<Map<String, Value>> = docs
                .iter()
                .flat_map(|doc| collect_path(doc, path))
                .filter(|value| value.is_object())
                .map(|value| wrap_at_path(path, value.clone()))
                .collect();

            let mut result = match spec.get("aggs").or_else(|| spec.get("aggregations")) {
                Some(sub_aggs) => aggregate(sub_aggs, &inner)?,
                None => Map::new(),
            };
            result.insert("doc_count".to_string(), json!(inner.len()));
            Value::Object(result)
        } else {
            return Err(unsupported(format!("aggregation {}", spec)));
        };
        results.insert(name.clone(), result);
    }
    Ok(results)
}

/// Buckets of distinct values, most frequent first, then by value.
fn terms_aggregation(params: &Value, docs: &[Map<String, Value>]) -> Result<Value, SearchIndexError> {
    let field = params
        .get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| unsupported("terms aggregation without field"))?;
    let size = usize_param(params, "size").unwrap_or(DEFAULT_SIZE);

    let mut counts: Vec<(Value, u64)> = Vec::new();
    for doc in docs {
        let mut seen: Vec<&Value> = Vec::new();
        for value in field_values(doc, field) {
            let scalar = value.is_string() || value.is_number() || value.is_boolean();
            if !scalar || seen.contains(&value) {
                continue;
            }
            seen.push(value);
            match counts.iter_mut().find(|(key, _)| *key == *value) {
                Some((_, count)) => *count += 1,
                None => counts.push((value.clone(), 1)),
            }
        }
    }

    counts.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| compare_values(&a.0, &b.0).unwrap_or(Ordering::Equal))
    });
    let buckets: Vec<Value> = counts
        .into_iter()
        .take(size)
        .map(|(key, doc_count)| json!({"key": key, "doc_count": doc_count}))
        .collect();

    Ok(json!({ "buckets": buckets }))
}

/// Re-root a nested object under its path so full field names resolve.
fn wrap_at_path(path: &str, value: Value) -> Map<String, Value> {
    let mut parts: Vec<&str> = path.split('.').collect();
    let last = parts.pop().unwrap_or(path);

    let mut wrapped = Map::new();
    wrapped.insert(last.to_string(), value);
    for part in parts.into_iter().rev() {
        let mut outer = Map::new();
        outer.insert(part.to_string(), Value::Object(wrapped));
        wrapped = outer;
    }
    wrapped
}

fn usize_param(body: &Value, key: &str) -> Option<usize> {
    body.get(key)
        .and_then(Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
}

/// Evaluate a query clause. `Some(score)` when the document matches.
pub fn evaluate(query: &Value, doc: &Map<String, Value>) -> Result<Option<f64>, SearchIndexError> {
    let (kind, params) = single_entry(query)?;

    match kind {
        "match_all" => Ok(Some(boost(params))),
        "match_none" => Ok(None),
        "bool" => evaluate_bool(params, doc),
        "nested" => {
            let inner = params
                .get("query")
                .ok_or_else(|| unsupported("nested query without query"))?;
            evaluate(inner, doc)
        }
        "exists" => {
            let field = params
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| unsupported("exists without field"))?;
            Ok(matched(!field_values(doc, field).is_empty(), 1.0))
        }
        "term" => {
            let (field, value) = field_param(params)?;
            let expected = param_query(value);
            let expected_text = scalar_text(expected);
            let found = field_values(doc, field).into_iter().any(|v| {
                v == expected || (expected_text.is_some() && scalar_text(v) == expected_text)
            });
            Ok(matched(found, boost(value)))
        }
        "terms" => {
            let (field, wanted) = field_param(params)?;
            let wanted = wanted
                .as_array()
                .ok_or_else(|| unsupported("terms query without a list of values"))?;
            let found = field_values(doc, field).into_iter().any(|v| {
                let text = scalar_text(v);
                wanted
                    .iter()
                    .any(|w| w == v || (text.is_some() && scalar_text(w) == text))
            });
            Ok(matched(found, 1.0))
        }
        "match" => {
            let (field, value) = field_param(params)?;
            let wanted = tokens(&scalar_text(param_query(value)).unwrap_or_default());
            let and = value.get("operator").and_then(Value::as_str) == Some("and");
            let have = field_tokens(doc, field);
            Ok(matched(tokens_match(&wanted, &have, and), boost(value)))
        }
        "match_phrase" => {
            let (field, value) = field_param(params)?;
            let phrase = scalar_text(param_query(value)).unwrap_or_default();
            Ok(matched(phrase_matches(doc, field, &phrase), boost(value)))
        }
        "multi_match" => {
            let text = params
                .get("query")
                .and_then(scalar_text)
                .unwrap_or_default();
            let wanted = tokens(&text);
            let and = params.get("operator").and_then(Value::as_str) == Some("and");
            let have: Vec<String> = params
                .get("fields")
                .and_then(Value::as_array)
                .map(|fields| {
                    fields
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|f| f.split('^').next().unwrap_or(f))
                        .flat_map(|f| field_tokens(doc, f))
                        .collect()
                })
                .unwrap_or_default();
            Ok(matched(tokens_match(&wanted, &have, and), 1.0))
        }
        "range" => {
            let (field, bounds) = field_param(params)?;
            let found = field_values(doc, field)
                .into_iter()
                .any(|v| within_bounds(v, bounds));
            Ok(matched(found, 1.0))
        }
        other => Err(unsupported(format!("query type {:?}", other))),
    }
}

fn evaluate_bool(params: &Value, doc: &Map<String, Value>) -> Result<Option<f64>, SearchIndexError> {
    let mut score = 0.0;

    for clause in clauses(params, "must").chain(clauses(params, "filter")) {
        match evaluate(clause, doc)? {
            Some(s) => score += s,
            None => return Ok(None),
        }
    }

    for clause in clauses(params, "must_not") {
        if evaluate(clause, doc)?.is_some() {
            return Ok(None);
        }
    }

    let should: Vec<&Value> = clauses(params, "should").collect();
    let has_required = params.get("must").is_some() || params.get("filter").is_some();
    let minimum = params
        .get("minimum_should_match")
        .and_then(Value::as_u64)
        .unwrap_or(if has_required || should.is_empty() { 0 } else { 1 });

    let mut should_matched = 0u64;
    for clause in should {
        if let Some(s) = evaluate(clause, doc)? {
            should_matched += 1;
            score += s;
        }
    }

    if should_matched < minimum {
        return Ok(None);
    }
    Ok(Some(score.max(f64::MIN_POSITIVE)))
}

/// Clauses under a bool key, which may hold one query or a list.
fn clauses<'a>(params: &'a Value, key: &str) -> Box<dyn Iterator<Item = &'a Value> + 'a> {
    match params.get(key) {
        Some(Value::Array(items)) => Box::new(items.iter()),
        Some(single) => Box::new(std::iter::once(single)),
        None => Box::new(std::iter::empty()),
    }
}

fn single_entry(query: &Value) -> Result<(&str, &Value), SearchIndexError> {
    query
        .as_object()
        .filter(|obj| obj.len() == 1)
        .and_then(|obj| obj.iter().next())
        .map(|(k, v)| (k.as_str(), v))
        .ok_or_else(|| unsupported(format!("malformed query clause {}", query)))
}

fn field_param(params: &Value) -> Result<(&str, &Value), SearchIndexError> {
    single_entry(params)
}

/// The query value of a leaf clause in either `{field: value}` or
/// `{field: {"query": value}}` form.
fn param_query(value: &Value) -> &Value {
    value.get("query").unwrap_or(value)
}

fn boost(value: &Value) -> f64 {
    value.get("boost").and_then(Value::as_f64).unwrap_or(1.0)
}

fn matched(found: bool, score: f64) -> Option<f64> {
    found.then_some(score)
}

fn unsupported(msg: impl Into<String>) -> SearchIndexError {
    SearchIndexError::search(format!("unsupported in-memory query: {}", msg.into()))
}

/// All non-null values at a dotted path, descending through arrays.
pub fn field_values<'a>(doc: &'a Map<String, Value>, path: &str) -> Vec<&'a Value> {
    let values = collect_path(doc, path);
    if !values.is_empty() {
        return values;
    }

    SUBFIELD_SUFFIXES
        .iter()
        .find_map(|suffix| path.strip_suffix(suffix))
        .map(|parent| collect_path(doc, parent))
        .unwrap_or_default()
}

fn collect_path<'a>(doc: &'a Map<String, Value>, path: &str) -> Vec<&'a Value> {
    let mut parts = path.split('.');
    let Some(first) = parts.next() else {
        return Vec::new();
    };

    let mut current: Vec<&Value> = doc.get(first).into_iter().collect();
    for part in parts {
        current = current
            .into_iter()
            .flat_map(flatten)
            .filter_map(|v| v.as_object().and_then(|obj| obj.get(part)))
            .collect();
    }

    current
        .into_iter()
        .flat_map(flatten)
        .filter(|v| !v.is_null())
        .collect()
}

fn flatten(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().flat_map(flatten).collect(),
        other => vec![other],
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn field_tokens(doc: &Map<String, Value>, field: &str) -> Vec<String> {
    field_values(doc, field)
        .into_iter()
        .filter_map(scalar_text)
        .flat_map(|text| tokens(&text))
        .collect()
}

fn tokens_match(wanted: &[String], have: &[String], all: bool) -> bool {
    if wanted.is_empty() {
        return false;
    }
    if all {
        wanted.iter().all(|t| have.contains(t))
    } else {
        wanted.iter().any(|t| have.contains(t))
    }
}

fn phrase_matches(doc: &Map<String, Value>, field: &str, phrase: &str) -> bool {
    let values = field_values(doc, field);

    if field.ends_with(".keyword") {
        let phrase = phrase.to_lowercase();
        return values
            .into_iter()
            .filter_map(scalar_text)
            .any(|v| v.to_lowercase() == phrase);
    }

    let wanted = tokens(phrase);
    if wanted.is_empty() {
        return false;
    }
    values
        .into_iter()
        .filter_map(scalar_text)
        .any(|v| tokens(&v).windows(wanted.len()).any(|w| w == wanted.as_slice()))
}

fn within_bounds(value: &Value, bounds: &Value) -> bool {
    let check = |key: &str, accept: fn(Ordering) -> bool| {
        bounds
            .get(key)
            .map_or(true, |bound| compare_values(value, bound).is_some_and(accept))
    };

    check("gte", |o| o != Ordering::Less)
        && check("gt", |o| o == Ordering::Greater)
        && check("lte", |o| o != Ordering::Greater)
        && check("lt", |o| o == Ordering::Less)
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => Some(scalar_text(a)?.to_lowercase().cmp(&scalar_text(b)?.to_lowercase())),
    }
}

enum SortKey {
    Score,
    Field {
        path: String,
        descending: bool,
        missing_first: bool,
    },
}

fn sort_keys(sort: &Value) -> Result<Vec<SortKey>, SearchIndexError> {
    let entries: Vec<&Value> = match sort {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };

    entries
        .into_iter()
        .map(|entry| match entry {
            Value::String(field) if field == "_score" => Ok(SortKey::Score),
            Value::String(field) => Ok(SortKey::Field {
                path: field.clone(),
                descending: false,
                missing_first: false,
            }),
            Value::Object(_) => {
                let (field, params) = single_entry(entry)?;
                let descending = params.get("order").and_then(Value::as_str) == Some("desc");
                let missing_first = params.get("missing").and_then(Value::as_str) == Some("_first");
                Ok(SortKey::Field {
                    path: field.to_string(),
                    descending,
                    missing_first,
                })
            }
            other => Err(unsupported(format!("sort entry {}", other))),
        })
        .collect()
}

fn compare_by_keys(keys: &[SortKey], a: &ScoredCandidate<'_>, b: &ScoredCandidate<'_>) -> Ordering {
    for key in keys {
        let ordering = match key {
            SortKey::Score => b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal),
            SortKey::Field {
                path,
                descending,
                missing_first,
            } => {
                let left = sort_value(a, path);
                let right = sort_value(b, path);
                match (left, right) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) if *missing_first => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (Some(_), None) if *missing_first => Ordering::Greater,
                    (Some(_), None) => Ordering::Less,
                    (Some(l), Some(r)) => {
                        let ordering = compare_values(l, r).unwrap_or(Ordering::Equal);
                        if *descending {
                            ordering.reverse()
                        } else {
                            ordering
                        }
                    }
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn sort_value<'a>(candidate: &ScoredCandidate<'a>, path: &str) -> Option<&'a Value> {
    if path == "_id" {
        return None;
    }
    field_values(candidate.candidate.source, path).into_iter().next()
}
