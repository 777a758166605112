//! SQLite reader
//!
//! Backs CSV descriptors: the parsed CSV is registered as a table of an
//! in-memory SQLite database that lives as long as the reader.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use polars::prelude::{AnyValue, Column, DataFrame, DataType, TimeUnit};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};

use super::{ColumnInfo, Dialect, ForeignKey, Reader};
use crate::{AskdbError, Result, Rows, Value};

/// In-memory SQLite database
///
/// `rusqlite::Connection` is not `Sync`, so it sits behind a mutex. The lock is
/// only held for the duration of a synchronous call and never across `.await`.
pub struct SqliteReader {
    conn: Mutex<Connection>,
}

impl SqliteReader {
    /// Open an empty in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            AskdbError::ConnectionError(format!("Failed to open in-memory SQLite: {}", e))
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            AskdbError::InternalError(format!(
                "SQLite connection unavailable (mutex poisoned): {}",
                e
            ))
        })
    }

    /// Prepare and run one statement; with `read_only`, SQLite must report that it cannot write
    fn run(&self, sql: &str, read_only: bool) -> Result<Rows> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AskdbError::ExecutionError(e.to_string()))?;

        if read_only && !stmt.readonly() {
            return Err(AskdbError::ExecutionError(format!(
                "Refusing to run a statement that writes to the database: {}",
                sql
            )));
        }

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        if columns.is_empty() {
            stmt.execute([])
                .map_err(|e| AskdbError::ExecutionError(e.to_string()))?;
            return Ok(Rows::empty());
        }

        let width = columns.len();
        let mut out = Vec::new();
        let mut rows = stmt
            .query([])
            .map_err(|e| AskdbError::ExecutionError(e.to_string()))?;
        while let Some(row) = rows
            .next()
            .map_err(|e| AskdbError::ExecutionError(e.to_string()))?
        {
            let mut record = Vec::with_capacity(width);
            for idx in 0..width {
                let cell = row
                    .get_ref(idx)
                    .map_err(|e| AskdbError::ExecutionError(e.to_string()))?;
                record.push(sqlite_value(cell));
            }
            out.push(record);
        }

        Ok(Rows::new(columns, out))
    }

    fn introspection_error(table: &str, e: rusqlite::Error) -> AskdbError {
        AskdbError::IntrospectionError(format!("Failed to inspect table '{}': {}", table, e))
    }
}

#[async_trait]
impl Reader for SqliteReader {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )
            .map_err(|e| AskdbError::IntrospectionError(format!("Failed to list tables: {}", e)))?;

        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| AskdbError::IntrospectionError(format!("Failed to list tables: {}", e)))?;
        Ok(names)
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let conn = self.lock()?;
        let sql = format!("PRAGMA table_info({})", Dialect::Sqlite.quote_ident(table));
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Self::introspection_error(table, e))?;

        // table_info: cid, name, type, notnull, dflt_value, pk
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo::new(
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                ))
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| Self::introspection_error(table, e))?;
        Ok(columns)
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let conn = self.lock()?;
        let sql = format!("PRAGMA foreign_key_list({})", Dialect::Sqlite.quote_ident(table));
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Self::introspection_error(table, e))?;

        // foreign_key_list: id, seq, table, from, to, on_update, on_delete, match
        let entries = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| Self::introspection_error(table, e))?;

        // One constraint spans several rows (one per column), grouped by id
        let mut keys: Vec<(i64, ForeignKey)> = Vec::new();
        for (id, referred_table, from, to) in entries {
            let position = match keys.iter().position(|(key_id, _)| *key_id == id) {
                Some(position) => position,
                None => {
                    keys.push((
                        id,
                        ForeignKey {
                            referred_table,
                            constrained_columns: Vec::new(),
                            referred_columns: Vec::new(),
                        },
                    ));
                    keys.len() - 1
                }
            };
            let key = &mut keys[position].1;
            key.constrained_columns.push(from);
            // A NULL target column means the parent's primary key
            if let Some(to) = to {
                key.referred_columns.push(to);
            }
        }
        Ok(keys.into_iter().map(|(_, key)| key).collect())
    }

    async fn execute_sql(&self, sql: &str) -> Result<Rows> {
        self.run(sql, false)
    }

    async fn execute_read_only(&self, sql: &str) -> Result<Rows> {
        self.run(sql, true)
    }

    fn register(&self, name: &str, df: DataFrame) -> Result<()> {
        let mut conn = self.lock()?;
        let table = Dialect::Sqlite.quote_ident(name);
        let register_error =
            |e: rusqlite::Error| AskdbError::ExecutionError(format!("Failed to register table '{}': {}", name, e));

        let tx = conn.transaction().map_err(register_error)?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", table), [])
            .map_err(register_error)?;

        let column_defs: Vec<String> = df
            .get_columns()
            .iter()
            .map(|column| {
                format!(
                    "{} {}",
                    Dialect::Sqlite.quote_ident(column.name().as_str()),
                    declared_type(column.dtype())
                )
            })
            .collect();
        tx.execute(
            &format!("CREATE TABLE {} ({})", table, column_defs.join(", ")),
            [],
        )
        .map_err(register_error)?;

        {
            let placeholders = vec!["?"; df.width()].join(", ");
            let mut insert = tx
                .prepare(&format!("INSERT INTO {} VALUES ({})", table, placeholders))
                .map_err(register_error)?;

            let columns = df.get_columns();
            for idx in 0..df.height() {
                let values: Vec<SqlValue> = columns
                    .iter()
                    .map(|column| column_value_to_sql(column, idx))
                    .collect();
                insert
                    .execute(params_from_iter(values))
                    .map_err(register_error)?;
            }
        }

        tx.commit().map_err(register_error)?;
        Ok(())
    }
}

// ============================================================================
// Type Conversion
// ============================================================================

/// SQLite column type declared for a DataFrame dtype
fn declared_type(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Boolean => "BOOLEAN",
        DataType::Date => "DATE",
        DataType::Datetime(_, _) => "TIMESTAMP",
        DataType::Time => "TIME",
        dt if dt.is_integer() => "BIGINT",
        dt if dt.is_float() => "FLOAT",
        _ => "TEXT",
    }
}

/// Convert a single value from a Polars Column to a SQLite value
fn column_value_to_sql(column: &Column, idx: usize) -> SqlValue {
    let any_value = match column.get(idx) {
        Ok(v) => v,
        Err(_) => return SqlValue::Null,
    };

    match any_value {
        AnyValue::Null => SqlValue::Null,
        AnyValue::Boolean(b) => SqlValue::Integer(b as i64),
        AnyValue::Int8(v) => SqlValue::Integer(v as i64),
        AnyValue::Int16(v) => SqlValue::Integer(v as i64),
        AnyValue::Int32(v) => SqlValue::Integer(v as i64),
        AnyValue::Int64(v) => SqlValue::Integer(v),
        AnyValue::UInt8(v) => SqlValue::Integer(v as i64),
        AnyValue::UInt16(v) => SqlValue::Integer(v as i64),
        AnyValue::UInt32(v) => SqlValue::Integer(v as i64),
        AnyValue::UInt64(v) => match i64::try_from(v) {
            Ok(v) => SqlValue::Integer(v),
            Err(_) => SqlValue::Real(v as f64),
        },
        AnyValue::Float32(v) => SqlValue::Real(v as f64),
        AnyValue::Float64(v) => SqlValue::Real(v),
        AnyValue::String(s) => SqlValue::Text(s.to_string()),
        AnyValue::StringOwned(s) => SqlValue::Text(s.to_string()),
        AnyValue::Date(days) => {
            let date = chrono::NaiveDate::default() + chrono::Duration::days(days as i64);
            SqlValue::Text(date.format("%Y-%m-%d").to_string())
        }
        AnyValue::Datetime(v, unit, _) => {
            let dt = match unit {
                TimeUnit::Nanoseconds => Some(chrono::DateTime::from_timestamp_nanos(v)),
                TimeUnit::Microseconds => chrono::DateTime::from_timestamp_micros(v),
                TimeUnit::Milliseconds => chrono::DateTime::from_timestamp_millis(v),
            };
            match dt {
                Some(dt) => SqlValue::Text(dt.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
                None => SqlValue::Null,
            }
        }
        other => {
            tracing::debug!("Storing unsupported Polars value as text: {:?}", other);
            SqlValue::Text(format!("{}", other))
        }
    }
}

/// Decode a SQLite cell
fn sqlite_value(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}
