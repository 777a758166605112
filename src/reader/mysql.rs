//! MySQL reader
//!
//! A small sqlx pool opened for one request. Schema questions are answered
//! from `information_schema`; result cells are decoded by their MySQL type
//! name so dates, times and decimals keep their meaning until serialization.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Executor, MySql, Row, TypeInfo};
use tracing::debug;

use super::{ColumnInfo, Dialect, ForeignKey, MySqlTarget, Reader};
use crate::{AskdbError, Result, Rows, Value};

/// Connections per request-scoped pool
const POOL_SIZE: u32 = 2;

pub struct MySqlReader {
    pool: MySqlPool,
}

impl MySqlReader {
    /// Connect to the target, failing fast if the server is unreachable
    pub async fn connect(target: &MySqlTarget) -> Result<Self> {
        let options = MySqlConnectOptions::from_str(&target.connection_url())
            .map_err(|e| AskdbError::ConnectionError(format!("Invalid MySQL URL: {}", e)))?;

        let pool = MySqlPoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect_with(options)
            .await
            .map_err(|e| {
                AskdbError::ConnectionError(format!(
                    "Failed to connect to {}: {}",
                    target.redacted_url(),
                    e
                ))
            })?;

        Ok(Self { pool })
    }

    fn introspection_error(table: &str, e: sqlx::Error) -> AskdbError {
        AskdbError::IntrospectionError(format!("Failed to inspect table '{}': {}", table, e))
    }
}

#[async_trait]
impl Reader for MySqlReader {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        // information_schema columns may be reported as binary strings; CAST keeps them decodable as text
        sqlx::query_scalar::<_, String>(
            "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
             ORDER BY TABLE_NAME",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AskdbError::IntrospectionError(format!("Failed to list tables: {}", e)))
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let columns = sqlx::query_as::<_, (String, String)>(
            "SELECT CAST(COLUMN_NAME AS CHAR), CAST(COLUMN_TYPE AS CHAR) \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::introspection_error(table, e))?;

        Ok(columns
            .into_iter()
            .map(|(name, data_type)| ColumnInfo::new(name, data_type.to_uppercase()))
            .collect())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let entries = sqlx::query_as::<_, (String, String, String, String)>(
            "SELECT CAST(CONSTRAINT_NAME AS CHAR), CAST(COLUMN_NAME AS CHAR), \
                    CAST(REFERENCED_TABLE_NAME AS CHAR), CAST(REFERENCED_COLUMN_NAME AS CHAR) \
             FROM information_schema.KEY_COLUMN_USAGE \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
               AND REFERENCED_TABLE_NAME IS NOT NULL \
             ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::introspection_error(table, e))?;

        let mut keys: Vec<(String, ForeignKey)> = Vec::new();
        for (constraint, column, referred_table, referred_column) in entries {
            match keys.iter_mut().find(|(name, _)| *name == constraint) {
                Some((_, key)) => {
                    key.constrained_columns.push(column);
                    key.referred_columns.push(referred_column);
                }
                None => keys.push((
                    constraint,
                    ForeignKey {
                        referred_table,
                        constrained_columns: vec![column],
                        referred_columns: vec![referred_column],
                    },
                )),
            }
        }
        Ok(keys.into_iter().map(|(_, key)| key).collect())
    }

    async fn execute_sql(&self, sql: &str) -> Result<Rows> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AskdbError::ExecutionError(e.to_string()))?;
        Ok(decode_rows(&rows))
    }

    async fn execute_read_only(&self, sql: &str) -> Result<Rows> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AskdbError::ConnectionError(e.to_string()))?;

        (&mut *conn)
            .execute("START TRANSACTION READ ONLY")
            .await
            .map_err(|e| AskdbError::ExecutionError(e.to_string()))?;

        let fetched = sqlx::query(sql).fetch_all(&mut *conn).await;

        // Nothing may be committed, whatever the statement did
        if let Err(e) = (&mut *conn).execute("ROLLBACK").await {
            debug!("Rollback after read-only statement failed: {}", e);
        }

        let rows = fetched.map_err(|e| AskdbError::ExecutionError(e.to_string()))?;
        Ok(decode_rows(&rows))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

// ============================================================================
// Cell Decoding
// ============================================================================

/// Columns come from the first row; an empty result has none
fn decode_rows(rows: &[MySqlRow]) -> Rows {
    let Some(first) = rows.first() else {
        return Rows::empty();
    };

    let columns: Vec<String> = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let type_names: Vec<String> = first
        .columns()
        .iter()
        .map(|c| c.type_info().name().to_string())
        .collect();

    let values: Vec<Vec<Value>> = rows
        .iter()
        .map(|row| {
            type_names
                .iter()
                .enumerate()
                .map(|(idx, type_name)| mysql_cell(row, idx, type_name))
                .collect()
        })
        .collect();

    Rows::new(columns, values)
}

/// `None` when the cell cannot be decoded as `T`, `Some(None)` for SQL NULL
fn decode<'r, T>(row: &'r MySqlRow, idx: usize) -> Option<Option<T>>
where
    T: sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get::<Option<T>, _>(idx).ok()
}

/// Decode a cell by its MySQL type name, falling back to text and then bytes
fn mysql_cell(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
    use rust_decimal::Decimal;
    use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    let typed = match type_name {
        "BOOLEAN" => decode::<bool>(row, idx).map(|v| v.map(Value::Bool)),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            decode::<i64>(row, idx).map(|v| v.map(Value::Int))
        }
        t if t.ends_with("UNSIGNED") => decode::<u64>(row, idx).map(|v| v.map(Value::UInt)),
        "FLOAT" => decode::<f32>(row, idx).map(|v| v.map(|f| Value::Float(f as f64))),
        "DOUBLE" => decode::<f64>(row, idx).map(|v| v.map(Value::Float)),
        "DECIMAL" => decode::<Decimal>(row, idx).map(|v| v.map(|d| Value::Decimal(d.to_string()))),
        "DATE" => decode::<NaiveDate>(row, idx).map(|v| v.map(Value::Date)),
        "DATETIME" => decode::<NaiveDateTime>(row, idx).map(|v| v.map(Value::DateTime)),
        "TIMESTAMP" => decode::<DateTime<Utc>>(row, idx)
            .map(|v| v.map(|dt| Value::DateTime(dt.naive_utc()))),
        "TIME" => decode::<NaiveTime>(row, idx).map(|v| v.map(Value::Time)),
        _ => None,
    };

    typed
        .or_else(|| decode::<String>(row, idx).map(|v| v.map(Value::Text)))
        .or_else(|| decode::<Vec<u8>>(row, idx).map(|v| v.map(Value::Bytes)))
        .unwrap_or_else(|| {
            debug!("Could not decode MySQL {} value in column {}", type_name, idx);
            None
        })
        .unwrap_or(Value::Null)
}
