//! PostgreSQL row source.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use search_sync_shared::SourceRow;
use serde_json::Value;
use sqlx::{types::Json, PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::errors::SourceError;
use crate::interfaces::{KeyStream, RowSource};

/// Where one entity's rows live and how to fetch them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    /// Table holding the entity, optionally schema-qualified.
    pub table: String,
    /// Primary key column (must be a `uuid`).
    pub primary_key: String,
    /// Column ordering rows by most recent modification, if the table has one.
    pub recency_column: Option<String>,
    /// Query returning `id uuid` and `row json` columns for the keys bound to
    /// `$1` (a `uuid[]`), with related rows joined in as nested JSON.
    pub rows_sql: String,
}

/// [`RowSource`] reading one entity from PostgreSQL.
///
/// Primary keys are streamed from the server rather than loaded up front, so
/// syncing a large table holds at most one batch of rows in memory.
pub struct PostgresRowSource {
    pool: PgPool,
    query: SourceQuery,
    count_sql: String,
    keys_sql: String,
}

impl PostgresRowSource {
    /// Create a row source, validating the table and column identifiers.
    pub fn new(pool: PgPool, query: SourceQuery) -> Result<Self, SourceError> {
        validate_identifier(&query.table)?;
        validate_identifier(&query.primary_key)?;
        if let Some(column) = &query.recency_column {
            validate_identifier(column)?;
        }
        if !query.rows_sql.contains("$1") {
            return Err(SourceError::invalid_query(format!(
                "rows query for {} does not bind the key list",
                query.table
            )));
        }

        let count_sql = format!("SELECT COUNT(*) FROM {}", query.table);
        let keys_sql = keys_sql(&query);

        Ok(Self {
            pool,
            query,
            count_sql,
            keys_sql,
        })
    }

    pub fn query(&self) -> &SourceQuery {
        &self.query
    }
}

fn keys_sql(query: &SourceQuery) -> String {
    match &query.recency_column {
        Some(recency) => format!(
            "SELECT {pk} FROM {table} ORDER BY {recency} DESC NULLS LAST, {pk}",
            pk = query.primary_key,
            table = query.table,
            recency = recency
        ),
        None => format!(
            "SELECT {pk} FROM {table} ORDER BY {pk}",
            pk = query.primary_key,
            table = query.table
        ),
    }
}

/// Accept `name` or `schema.name` made of lowercase letters, digits and
/// underscores.
fn validate_identifier(identifier: &str) -> Result<(), SourceError> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    };

    let parts: Vec<&str> = identifier.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|part| valid_part(part)) {
        Ok(())
    } else {
        Err(SourceError::invalid_query(format!(
            "invalid SQL identifier: {:?}",
            identifier
        )))
    }
}

#[async_trait]
impl RowSource for PostgresRowSource {
    async fn count(&self) -> Result<u64, SourceError> {
        let count: i64 = sqlx::query_scalar(&self.count_sql)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.unsigned_abs())
    }

    async fn primary_keys(&self) -> Result<KeyStream<'_>, SourceError> {
        let stream = sqlx::query_scalar::<_, Uuid>(&self.keys_sql)
            .fetch(&self.pool)
            .map_err(SourceError::from);
        Ok(stream.boxed())
    }

    async fn fetch_rows(&self, ids: &[Uuid]) -> Result<Vec<SourceRow>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&self.query.rows_sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        debug!(
            table = %self.query.table,
            requested = ids.len(),
            fetched = rows.len(),
            "Fetched source rows"
        );

        rows.iter()
            .map(|row| -> Result<SourceRow, SourceError> {
                let id: Uuid = row.try_get("id")?;
                let Json(data): Json<Value> = row.try_get("row")?;
                Ok(SourceRow::from_value(id, data))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(recency: Option<&str>) -> SourceQuery {
        SourceQuery {
            table: "company_company".to_string(),
            primary_key: "id".to_string(),
            recency_column: recency.map(str::to_string),
            rows_sql: "SELECT id, row_to_json(c) AS row FROM company_company c WHERE id = ANY($1)"
                .to_string(),
        }
    }

    #[test]
    fn test_keys_sql_orders_newest_first() {
        assert_eq!(
            keys_sql(&query(Some("modified_on"))),
            "SELECT id FROM company_company ORDER BY modified_on DESC NULLS LAST, id"
        );
        assert_eq!(
            keys_sql(&query(None)),
            "SELECT id FROM company_company ORDER BY id"
        );
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("company_company").is_ok());
        assert!(validate_identifier("public.company_company").is_ok());
        assert!(validate_identifier("_private2").is_ok());

        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("Company").is_err());
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("a.b.c").is_err());
        assert!(validate_identifier("company; DROP TABLE x").is_err());
    }
}
