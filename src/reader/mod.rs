//! Data source abstraction layer for askdb
//!
//! The reader module turns a connection descriptor into a live, request-scoped
//! handle that can be introspected and queried.
//!
//! # Architecture
//!
//! All readers implement the `Reader` trait, which provides:
//! - Table, column and foreign key enumeration
//! - SQL execution → [`Rows`] conversion
//! - Optional DataFrame registration for queryable tables
//!
//! Two backends exist:
//! - [`SqliteReader`] - an in-memory SQLite database, seeded from CSV content
//! - `MySqlReader` - a MySQL connection pool (feature `mysql`)
//!
//! # Example
//!
//! ```rust,ignore
//! use askdb::reader::{resolve, ConnectionDescriptor, Reader};
//!
//! let descriptor: ConnectionDescriptor = serde_json::from_str(
//!     r#"{"type": "csv", "config": {"csvContent": "id,name\n1,Alice"}}"#,
//! )?;
//! let reader = resolve(&descriptor, &settings).await?;
//! let rows = reader.execute_sql("SELECT * FROM data").await?;
//! ```

use async_trait::async_trait;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::{AskdbError, Result, Rows};

pub mod connection;
pub mod csv;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod sqlite;

pub use connection::{resolve, ConnectionDescriptor, CsvConfig, DbConnection, MySqlConfig, MySqlTarget};
#[cfg(feature = "mysql")]
pub use mysql::MySqlReader;
pub use sqlite::SqliteReader;

/// Table name CSV content is loaded under
pub const CSV_TABLE: &str = "data";

// ============================================================================
// Schema Types
// ============================================================================

/// A column as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as a human-readable string (e.g. `BIGINT`, `VARCHAR(255)`)
    #[serde(rename = "type")]
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A foreign key constraint of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub referred_table: String,
    pub constrained_columns: Vec<String>,
    pub referred_columns: Vec<String>,
}

/// SQL dialect spoken by a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "SQLite",
            Dialect::MySql => "MySQL",
        }
    }

    /// Prompt instruction for delimiting column names
    pub fn identifier_quoting(&self) -> &'static str {
        match self {
            Dialect::Sqlite => {
                "Wrap each column name in double quotes (\") to denote them as delimited identifiers."
            }
            Dialect::MySql => {
                "Wrap each column name in backticks (`) to denote them as delimited identifiers."
            }
        }
    }

    /// Quote an identifier for this dialect
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
        }
    }
}

// ============================================================================
// Reader Trait
// ============================================================================

/// Trait for data source readers
///
/// Readers execute SQL and report their schema. They provide a uniform
/// interface over the supported database backends. A reader is owned by the
/// request that resolved it.
#[async_trait]
pub trait Reader: Send + Sync {
    /// Dialect used when building prompts and quoting identifiers
    fn dialect(&self) -> Dialect;

    /// List table names, sorted by name
    ///
    /// # Errors
    ///
    /// Returns `AskdbError::IntrospectionError` if the tables cannot be listed.
    async fn table_names(&self) -> Result<Vec<String>>;

    /// List the columns of a table in declaration order
    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// List the foreign keys declared on a table
    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>>;

    /// Execute a SQL statement and return its result rows
    ///
    /// Statements that produce no result set (DDL, DML) return [`Rows::empty`].
    ///
    /// # Errors
    ///
    /// Returns `AskdbError::ExecutionError` if:
    /// - The SQL is invalid
    /// - The table or columns don't exist
    /// - The connection fails mid-query
    async fn execute_sql(&self, sql: &str) -> Result<Rows>;

    /// Execute a SQL statement only if the backend confirms it cannot write
    ///
    /// # Default Implementation
    ///
    /// Refuses every statement. Override for readers that can enforce it.
    async fn execute_read_only(&self, sql: &str) -> Result<Rows> {
        let _ = sql;
        Err(AskdbError::ExecutionError(
            "This reader cannot run statements in read-only mode".to_string(),
        ))
    }

    /// Fetch up to `limit` example rows of a table
    async fn sample_rows(&self, table: &str, limit: usize) -> Result<Rows> {
        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            self.dialect().quote_ident(table),
            limit
        );
        self.execute_sql(&sql).await
    }

    /// Register a DataFrame as a queryable table, replacing any existing table of that name
    ///
    /// # Default Implementation
    ///
    /// Returns an error by default. Override for readers that support registration.
    fn register(&self, name: &str, _df: DataFrame) -> Result<()> {
        Err(AskdbError::ExecutionError(format!(
            "This reader does not support DataFrame registration for table '{}'",
            name
        )))
    }

    /// Release the underlying connection(s)
    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(Dialect::Sqlite.quote_ident("data"), "\"data\"");
        assert_eq!(Dialect::Sqlite.quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(Dialect::MySql.quote_ident("orders"), "`orders`");
        assert_eq!(Dialect::MySql.quote_ident("a`b"), "`a``b`");
    }

    #[test]
    fn test_column_info_serializes_type_key() {
        let json = serde_json::to_value(ColumnInfo::new("id", "BIGINT")).unwrap();
        assert_eq!(json, serde_json::json!({"name": "id", "type": "BIGINT"}));
    }
}
