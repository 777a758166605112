//! Schema introspection
//!
//! Produces the [`SchemaSummary`] served by `/schema`: every table with its
//! columns, plus the foreign-key relationships between tables.

use serde::Serialize;
use tracing::{debug, warn};

use crate::reader::{ColumnInfo, ForeignKey, Reader};
use crate::{Result, Soft};

/// A table and its columns in declaration order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// A foreign key from `from.cols` to `to.refCols`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    pub cols: Vec<String>,
    #[serde(rename = "refCols")]
    pub ref_cols: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaSummary {
    pub tables: Vec<TableInfo>,
    pub relationships: Vec<Relationship>,
}

/// Look up a table's foreign keys, treating a failed lookup as "no keys"
pub async fn foreign_keys(reader: &dyn Reader, table: &str) -> Soft<Vec<ForeignKey>> {
    let keys = Soft::from_result(reader.foreign_keys(table).await, Vec::new);
    if let Some(reason) = keys.reason() {
        warn!("Skipping relationships of table '{}': {}", table, reason);
    }
    keys
}

/// Enumerate tables, columns and relationships
///
/// # Errors
///
/// Fails with `AskdbError::IntrospectionError` if tables or columns cannot be
/// listed. A failing foreign key lookup only drops that table's relationships.
pub async fn inspect(reader: &dyn Reader) -> Result<SchemaSummary> {
    let mut summary = SchemaSummary::default();

    for table in reader.table_names().await? {
        let columns = reader.columns(&table).await?;
        debug!("Table '{}' has {} columns", table, columns.len());

        for key in foreign_keys(reader, &table).await.into_inner() {
            summary.relationships.push(Relationship {
                from: table.clone(),
                to: key.referred_table,
                cols: key.constrained_columns,
                ref_cols: key.referred_columns,
            });
        }

        summary.tables.push(TableInfo {
            name: table,
            columns,
        });
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{Dialect, SqliteReader};
    use crate::{AskdbError, Rows};
    use async_trait::async_trait;
    use serde_json::json;

    async fn shop() -> SqliteReader {
        let reader = SqliteReader::in_memory().unwrap();
        reader
            .execute_sql("CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        reader
            .execute_sql(
                "CREATE TABLE orders (id INTEGER PRIMARY KEY, \
                 customer_id INTEGER REFERENCES customers(id), total REAL)",
            )
            .await
            .unwrap();
        reader
    }

    /// Delegates to SQLite but cannot report foreign keys of one table
    struct BrokenForeignKeys {
        inner: SqliteReader,
        broken: &'static str,
    }

    #[async_trait]
    impl Reader for BrokenForeignKeys {
        fn dialect(&self) -> Dialect {
            self.inner.dialect()
        }

        async fn table_names(&self) -> Result<Vec<String>> {
            self.inner.table_names().await
        }

        async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
            self.inner.columns(table).await
        }

        async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
            if table == self.broken {
                return Err(AskdbError::IntrospectionError("foreign keys unavailable".to_string()));
            }
            self.inner.foreign_keys(table).await
        }

        async fn execute_sql(&self, sql: &str) -> Result<Rows> {
            self.inner.execute_sql(sql).await
        }
    }

    #[tokio::test]
    async fn test_inspect_lists_tables_and_relationships() {
        let summary = inspect(&shop().await).await.unwrap();

        let names: Vec<&str> = summary.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["customers", "orders"]);
        assert_eq!(summary.tables[1].columns[1], ColumnInfo::new("customer_id", "INTEGER"));
        assert_eq!(
            summary.relationships,
            vec![Relationship {
                from: "orders".to_string(),
                to: "customers".to_string(),
                cols: vec!["customer_id".to_string()],
                ref_cols: vec!["id".to_string()],
            }]
        );
    }

    #[tokio::test]
    async fn test_failed_foreign_key_lookup_keeps_columns() {
        let reader = BrokenForeignKeys {
            inner: shop().await,
            broken: "orders",
        };

        let soft = foreign_keys(&reader, "orders").await;
        assert!(soft.is_fallback());

        let summary = inspect(&reader).await.unwrap();
        assert_eq!(summary.tables.len(), 2);
        assert_eq!(summary.tables[1].columns.len(), 3);
        assert!(summary.relationships.is_empty());
    }

    #[tokio::test]
    async fn test_summary_json_keys() {
        let summary = inspect(&shop().await).await.unwrap();
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            value["relationships"][0],
            json!({"from": "orders", "to": "customers", "cols": ["customer_id"], "refCols": ["id"]})
        );
        assert_eq!(value["tables"][0]["columns"][0], json!({"name": "id", "type": "INTEGER"}));
    }

    #[tokio::test]
    async fn test_empty_database() {
        let reader = SqliteReader::in_memory().unwrap();
        assert_eq!(inspect(&reader).await.unwrap(), SchemaSummary::default());
    }
}
