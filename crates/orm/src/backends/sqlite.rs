//! SQLite Backend Implementation
//!
//! Storage gateway over a single sqlx `SqliteConnection`. Foreign keys are
//! enforced on every connection. `sqlite::memory:` gives a private
//! throwaway database per gateway, which is what the test suites use.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Executor, Row, Sqlite, TypeInfo, ValueRef};

use super::core::*;
use crate::error::{OrmError, OrmResult};

/// SQLite storage gateway
pub struct SqliteGateway {
    conn: SqliteConnection,
}

impl SqliteGateway {
    /// Open a connection from a `sqlite:` URL, creating the file if needed
    pub async fn connect(database_url: &str) -> OrmResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| OrmError::Connection(format!("Invalid SQLite URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to open SQLite database: {}", e)))?;

        Ok(Self { conn })
    }

    /// Open a private in-memory database
    pub async fn in_memory() -> OrmResult<Self> {
        Self::connect("sqlite::memory:").await
    }
}

#[async_trait]
impl StorageGateway for SqliteGateway {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        tracing::debug!(statement = sql, "sqlite execute");

        let result = if params.is_empty() {
            (&mut self.conn).execute(sql).await
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_database_value(query, param);
            }
            query.execute(&mut self.conn).await
        };

        result
            .map(|done| done.rows_affected())
            .map_err(|e| OrmError::statement(sql, params, e))
    }

    async fn query(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<DatabaseRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_database_value(query, param);
        }

        let rows = query
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| OrmError::statement(sql, params, e))?;

        rows.iter().map(sqlite_row_to_database_row).collect()
    }

    async fn close(self: Box<Self>) -> OrmResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to close SQLite connection: {}", e)))
    }
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DatabaseValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
        DatabaseValue::Json(j) => query.bind(j.to_string()),
    }
}

fn sqlite_row_to_database_row(row: &SqliteRow) -> OrmResult<DatabaseRow> {
    let columns: Vec<String> = row.columns().iter().map(|col| col.name().to_string()).collect();
    let values = (0..columns.len())
        .map(|index| sqlite_value_to_database_value(row, index))
        .collect::<OrmResult<Vec<_>>>()?;

    Ok(DatabaseRow::new(columns, values))
}

/// Convert a SQLite column value to DatabaseValue.
///
/// SQLite is dynamically typed, so the value's storage class decides the
/// conversion rather than the declared column type.
fn sqlite_value_to_database_value(row: &SqliteRow, index: usize) -> OrmResult<DatabaseValue> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| OrmError::Query(format!("Failed to read column {}: {}", index, e)))?;

    if raw.is_null() {
        return Ok(DatabaseValue::Null);
    }
    let storage_class = raw.type_info().name().to_string();

    let decode_error = |e: sqlx::Error| {
        OrmError::Query(format!(
            "Failed to decode {} value in column {}: {}",
            storage_class, index, e
        ))
    };

    match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get_unchecked::<i64, _>(index)
            .map(DatabaseValue::Int64)
            .map_err(decode_error),
        "REAL" => row
            .try_get_unchecked::<f64, _>(index)
            .map(DatabaseValue::Float64)
            .map_err(decode_error),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(DatabaseValue::Bytes)
            .map_err(decode_error),
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(DatabaseValue::String)
            .map_err(decode_error),
    }
}
