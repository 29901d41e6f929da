//! Conversion of source rows into search documents.

pub mod dict_utils;
pub mod fields;

use search_sync_repository::BulkAction;
use search_sync_shared::{Document, SourceRow};
use serde_json::{Map, Value};

use crate::apps::SearchApp;

/// Map rows to documents, one per row, in row order.
///
/// The document id is the row's primary key, so mapping the same row again
/// yields a document that overwrites the previous one.
pub fn db_objects_to_documents(app: &SearchApp, rows: &[SourceRow]) -> Vec<Document> {
    rows.iter()
        .map(|row| Document::new(row.id, (app.mapper)(row)))
        .collect()
}

/// Upsert actions writing `documents` into `index`.
pub fn index_actions(index: &str, documents: Vec<Document>) -> Vec<BulkAction> {
    documents
        .into_iter()
        .map(|document| BulkAction::Index {
            index: index.to_string(),
            id: document.id,
            source: document.source,
        })
        .collect()
}

/// Copy plain columns of a row into a document body, `null` when absent.
pub fn copy_columns(row: &SourceRow, document: &mut Map<String, Value>, columns: &[&str]) {
    for column in columns {
        document.insert(
            column.to_string(),
            row.get(column).cloned().unwrap_or(Value::Null),
        );
    }
}

/// Latest value of `column` across the rows of a related list, comparing
/// ISO-8601 strings.
pub fn latest_related_value(row: &SourceRow, relation: &str, column: &str) -> Value {
    row.related_list(relation)
        .into_iter()
        .filter_map(|related| related.get(column).and_then(Value::as_str))
        .max()
        .map_or(Value::Null, |latest| Value::String(latest.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_sync_repository::memory::InMemoryRowSource;
    use search_sync_shared::IndexMapping;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    fn widget_body(row: &SourceRow) -> Map<String, Value> {
        let mut document = Map::new();
        copy_columns(row, &mut document, &["name", "colour"]);
        document
    }

    fn app() -> SearchApp {
        SearchApp::new(
            "widget",
            Arc::new(InMemoryRowSource::new()),
            IndexMapping::new(),
            widget_body,
        )
    }

    #[test]
    fn test_one_document_per_row() {
        let rows: Vec<SourceRow> = (0..3)
            .map(|i| {
                SourceRow::from_value(Uuid::new_v4(), json!({"name": format!("w{}", i), "colour": null}))
            })
            .collect();

        let documents = db_objects_to_documents(&app(), &rows);
        assert_eq!(documents.len(), 3);
        for (row, document) in rows.iter().zip(&documents) {
            assert_eq!(document.id, row.id.to_string());
            assert_eq!(document.get("id"), Some(&json!(row.id.to_string())));
            assert_eq!(document.get("colour"), Some(&Value::Null));
        }
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let row = SourceRow::from_value(Uuid::new_v4(), json!({"name": "w"}));
        let first = db_objects_to_documents(&app(), std::slice::from_ref(&row));
        let second = db_objects_to_documents(&app(), std::slice::from_ref(&row));
        assert_eq!(first, second);
    }

    #[test]
    fn test_index_actions() {
        let documents = vec![Document::new("a", Map::new())];
        let actions = index_actions("search-widget-write", documents);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].index(), "search-widget-write");
        assert_eq!(actions[0].id(), "a");
    }

    #[test]
    fn test_latest_related_value() {
        let row = SourceRow::from_value(
            Uuid::nil(),
            json!({"interactions": [
                {"date": "2021-03-01"},
                {"date": "2022-01-15"},
                {"date": null},
            ]}),
        );
        assert_eq!(latest_related_value(&row, "interactions", "date"), json!("2022-01-15"));
        assert_eq!(latest_related_value(&row, "missing", "date"), Value::Null);
    }
}
