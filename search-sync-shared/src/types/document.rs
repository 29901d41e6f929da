//! Source row and search document types.
//!
//! A [`SourceRow`] is one row of the source of truth, with related rows already
//! joined into nested JSON objects. A [`Document`] is what gets written to the
//! search index for that row.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One source-of-truth row as fetched for indexing.
///
/// `data` holds the row's columns plus any related rows, pre-joined as nested
/// objects (for example `sector: {"id": .., "name": ..}`). Absent relations are
/// either missing keys or JSON `null`; consumers must treat both the same way.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRow {
    pub id: Uuid,
    pub data: Map<String, Value>,
}

impl SourceRow {
    /// Create a row from its primary key and column data.
    pub fn new(id: Uuid, data: Map<String, Value>) -> Self {
        Self { id, data }
    }

    /// Build a row from a JSON value, which must be an object.
    ///
    /// Non-object values produce a row with no data.
    pub fn from_value(id: Uuid, value: Value) -> Self {
        match value {
            Value::Object(data) => Self { id, data },
            _ => Self {
                id,
                data: Map::new(),
            },
        }
    }

    /// Get a column, treating JSON `null` as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key).filter(|v| !v.is_null())
    }

    /// Get a string column.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Get a boolean column.
    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Get a pre-joined related row.
    pub fn related(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(Value::as_object)
    }

    /// Get a pre-joined list of related rows. Missing lists are empty.
    pub fn related_list(&self, key: &str) -> Vec<&Map<String, Value>> {
        self.get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_object).collect())
            .unwrap_or_default()
    }
}

/// A document stored in the search index.
///
/// The document id is always the source row's primary key rendered as a string,
/// so re-indexing the same row overwrites the same document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub source: Map<String, Value>,
}

impl Document {
    /// Create a document with the given id and body.
    ///
    /// The `id` field is also written into the body, since queries match and
    /// sort on it.
    pub fn new(id: impl ToString, mut source: Map<String, Value>) -> Self {
        let id = id.to_string();
        source.insert("id".to_string(), Value::String(id.clone()));
        Self { id, source }
    }

    /// Get a top-level field of the document body.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.source.get(field)
    }

    /// Resolve a dotted path (`company.name`) inside the document body.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.source.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> SourceRow {
        SourceRow::from_value(Uuid::nil(), value)
    }

    #[test]
    fn test_source_row_treats_null_as_absent() {
        let row = row(json!({"name": "Acme", "sector": null}));
        assert_eq!(row.str("name"), Some("Acme"));
        assert!(row.get("sector").is_none());
        assert!(row.related("sector").is_none());
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn test_source_row_from_non_object() {
        let row = row(json!([1, 2, 3]));
        assert!(row.data.is_empty());
    }

    #[test]
    fn test_related_list_skips_non_objects() {
        let row = row(json!({"contacts": [{"id": "a"}, 3, {"id": "b"}]}));
        assert_eq!(row.related_list("contacts").len(), 2);
        assert!(row.related_list("missing").is_empty());
    }

    #[test]
    fn test_document_id_written_to_body() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let doc = Document::new(id, Map::new());
        assert_eq!(doc.id, "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(doc.get("id"), Some(&json!(doc.id)));
    }

    #[test]
    fn test_document_get_path() {
        let mut source = Map::new();
        source.insert("company".to_string(), json!({"name": "Acme", "id": "1"}));
        let doc = Document::new("doc-1", source);
        assert_eq!(doc.get_path("company.name"), Some(&json!("Acme")));
        assert!(doc.get_path("company.missing").is_none());
        assert!(doc.get_path("id.nested").is_none());
    }
}
