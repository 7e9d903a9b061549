//! PostgreSQL Backend Implementation
//!
//! This module provides the PostgreSQL storage gateway using sqlx as the
//! underlying database driver. PostgreSQL runs DDL transactionally, so a
//! failed unit leaves no partial schema behind.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Executor, Postgres, Row, TypeInfo, ValueRef};

use super::core::*;
use crate::error::{OrmError, OrmResult};

/// PostgreSQL storage gateway
pub struct PostgresGateway {
    conn: PgConnection,
}

impl PostgresGateway {
    /// Open a connection from a `postgres://` URL
    pub async fn connect(database_url: &str) -> OrmResult<Self> {
        let conn = PgConnection::connect(database_url).await.map_err(|e| {
            OrmError::Connection(format!("Failed to connect to PostgreSQL: {}", e))
        })?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl StorageGateway for PostgresGateway {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        tracing::debug!(statement = sql, "postgres execute");

        // Without parameters the simple query protocol is used, which also
        // accepts multi-statement strings.
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

        rows.iter().map(postgres_row_to_database_row).collect()
    }

    async fn close(self: Box<Self>) -> OrmResult<()> {
        self.conn.close().await.map_err(|e| {
            OrmError::Connection(format!("Failed to close PostgreSQL connection: {}", e))
        })
    }
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &DatabaseValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
        DatabaseValue::Json(j) => query.bind(j.clone()),
    }
}

fn postgres_row_to_database_row(row: &PgRow) -> OrmResult<DatabaseRow> {
    let columns: Vec<String> = row.columns().iter().map(|col| col.name().to_string()).collect();
    let values = (0..columns.len())
        .map(|index| postgres_value_to_database_value(row, index))
        .collect::<OrmResult<Vec<_>>>()?;

    Ok(DatabaseRow::new(columns, values))
}

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value_to_database_value(row: &PgRow, index: usize) -> OrmResult<DatabaseValue> {
    let is_null = row
        .try_get_raw(index)
        .map(|raw| raw.is_null())
        .map_err(|e| OrmError::Query(format!("Failed to read column {}: {}", index, e)))?;
    if is_null {
        return Ok(DatabaseValue::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();
    let decode_error = |e: sqlx::Error| {
        OrmError::Query(format!("Failed to get {} value: {}", type_name, e))
    };

    match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(index).map(DatabaseValue::Bool).map_err(decode_error),
        "INT2" => row
            .try_get::<i16, _>(index)
            .map(|v| DatabaseValue::Int32(v as i32))
            .map_err(decode_error),
        "INT4" => row.try_get::<i32, _>(index).map(DatabaseValue::Int32).map_err(decode_error),
        "INT8" => row.try_get::<i64, _>(index).map(DatabaseValue::Int64).map_err(decode_error),
        "FLOAT4" => row
            .try_get::<f32, _>(index)
            .map(|v| DatabaseValue::Float64(v as f64))
            .map_err(decode_error),
        "FLOAT8" => row.try_get::<f64, _>(index).map(DatabaseValue::Float64).map_err(decode_error),
        "BYTEA" => row.try_get::<Vec<u8>, _>(index).map(DatabaseValue::Bytes).map_err(decode_error),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(DatabaseValue::DateTime)
            .map_err(decode_error),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(|naive| {
                DatabaseValue::DateTime(chrono::DateTime::from_naive_utc_and_offset(
                    naive,
                    chrono::Utc,
                ))
            })
            .map_err(decode_error),
        "JSON" | "JSONB" => row
            .try_get::<JsonValue, _>(index)
            .map(DatabaseValue::Json)
            .map_err(decode_error),
        _ => {
            // Fallback: try to get as string
            row.try_get::<String, _>(index).map(DatabaseValue::String).map_err(|e| {
                OrmError::Query(format!(
                    "Failed to get value as string for unknown type '{}': {}",
                    type_name, e
                ))
            })
        }
    }
}
