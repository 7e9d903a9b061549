//! MySQL Backend Implementation
//!
//! MySQL commits DDL implicitly, so `begin`/`commit` only protect the data
//! statements of a unit; its schema statements form a best-effort ordered
//! sequence.

use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Executor, MySql, Row, TypeInfo, ValueRef};

use super::core::*;
use crate::error::{OrmError, OrmResult};

/// MySQL / MariaDB storage gateway
pub struct MySqlGateway {
    conn: MySqlConnection,
}

impl MySqlGateway {
    /// Open a connection from a `mysql://` URL
    pub async fn connect(database_url: &str) -> OrmResult<Self> {
        let url = database_url.replacen("mariadb://", "mysql://", 1);
        let conn = MySqlConnection::connect(&url)
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to connect to MySQL: {}", e)))?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl StorageGateway for MySqlGateway {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::MySQL
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        tracing::debug!(statement = sql, "mysql execute");

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

        rows.iter().map(mysql_row_to_database_row).collect()
    }

    async fn close(self: Box<Self>) -> OrmResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to close MySQL connection: {}", e)))
    }
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &DatabaseValue,
) -> Query<'q, MySql, MySqlArguments> {
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

fn mysql_row_to_database_row(row: &MySqlRow) -> OrmResult<DatabaseRow> {
    let columns: Vec<String> = row.columns().iter().map(|col| col.name().to_string()).collect();
    let values = (0..columns.len())
        .map(|index| mysql_value_to_database_value(row, index))
        .collect::<OrmResult<Vec<_>>>()?;

    Ok(DatabaseRow::new(columns, values))
}

/// Convert a MySQL column value to DatabaseValue
fn mysql_value_to_database_value(row: &MySqlRow, index: usize) -> OrmResult<DatabaseValue> {
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
        "BOOLEAN" => row.try_get::<bool, _>(index).map(DatabaseValue::Bool).map_err(decode_error),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
            .try_get::<i64, _>(index)
            .map(DatabaseValue::Int64)
            .map_err(decode_error),
        name if name.ends_with("UNSIGNED") => row
            .try_get::<u64, _>(index)
            .map(|v| DatabaseValue::Int64(v as i64))
            .map_err(decode_error),
        "FLOAT" | "DOUBLE" => row
            .try_get::<f64, _>(index)
            .map(DatabaseValue::Float64)
            .map_err(decode_error),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(DatabaseValue::DateTime)
            .map_err(decode_error),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "VARBINARY" | "BINARY" => row
            .try_get::<Vec<u8>, _>(index)
            .map(DatabaseValue::Bytes)
            .map_err(decode_error),
        // DECIMAL and the textual types arrive as text on the wire
        _ => match row.try_get::<String, _>(index) {
            Ok(value) => Ok(DatabaseValue::String(value)),
            Err(_) => row
                .try_get_unchecked::<String, _>(index)
                .map(DatabaseValue::String)
                .map_err(decode_error),
        },
    }
}
