//! Core Database Backend Traits
//!
//! This module defines the storage gateway the migration engine talks to, the
//! backend-neutral value and row types it exchanges, and the SQL dialect
//! knowledge shared by the schema builder and the system-catalog probes.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::{OrmError, OrmResult};

/// Abstract storage gateway: one live connection to one database.
///
/// Transactions are bracketed explicitly with `begin`/`commit`/`rollback`
/// on the same connection; nesting is not supported.
#[async_trait]
pub trait StorageGateway: Send {
    /// SQL dialect spoken by this connection
    fn dialect(&self) -> SqlDialect;

    /// Execute a statement and return the affected rows count
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64>;

    /// Execute a query and return the result rows
    async fn query(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<DatabaseRow>>;

    /// Begin a transaction
    async fn begin(&mut self) -> OrmResult<()> {
        let sql = self.dialect().begin_transaction_sql();
        self.execute(sql, &[]).await.map(|_| ())
    }

    /// Commit the open transaction
    async fn commit(&mut self) -> OrmResult<()> {
        self.execute("COMMIT", &[]).await.map(|_| ())
    }

    /// Roll back the open transaction
    async fn rollback(&mut self) -> OrmResult<()> {
        self.execute("ROLLBACK", &[]).await.map(|_| ())
    }

    /// Close the connection
    async fn close(self: Box<Self>) -> OrmResult<()>;
}

/// A result row with its column names preserved in select order
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseRow {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl DatabaseRow {
    pub fn new(columns: Vec<String>, values: Vec<DatabaseValue>) -> Self {
        Self { columns, values }
    }

    /// Get a column value by index
    pub fn get_by_index(&self, index: usize) -> OrmResult<&DatabaseValue> {
        self.values
            .get(index)
            .ok_or_else(|| OrmError::Query(format!("Column index {} out of range", index)))
    }

    /// Get a column value by name (case-insensitive, catalogs disagree on case)
    pub fn get_by_name(&self, name: &str) -> OrmResult<&DatabaseValue> {
        let index = self
            .columns
            .iter()
            .position(|col| col.eq_ignore_ascii_case(name))
            .ok_or_else(|| OrmError::Query(format!("Column '{}' not found", name)))?;
        self.get_by_index(index)
    }

    /// Get a typed value from a column
    pub fn get<T>(&self, column: &str) -> OrmResult<T>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let json_value = self.get_by_name(column)?.to_json();
        serde_json::from_value(json_value).map_err(|e| {
            OrmError::Query(format!("Failed to deserialize column '{}': {}", column, e))
        })
    }

    /// Get column count
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get column names
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(chrono::DateTime<chrono::Utc>),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Integer view of the value, accepting numeric strings (MySQL returns
    /// some aggregates as DECIMAL text)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int32(i) => Some(*i as i64),
            DatabaseValue::Int64(i) => Some(*i),
            DatabaseValue::Bool(b) => Some(*b as i64),
            DatabaseValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Int64(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Json(j) => j.clone(),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DatabaseValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::Json(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// SQL dialect enumeration for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder style for this dialect
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL | SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Get the quote character for identifiers in this dialect
    pub fn identifier_quote(&self) -> char {
        match self {
            SqlDialect::PostgreSQL | SqlDialect::SQLite => '"',
            SqlDialect::MySQL => '`',
        }
    }

    /// Quote an identifier, doubling any embedded quote character
    pub fn quote(&self, identifier: &str) -> String {
        let q = self.identifier_quote();
        let escaped = identifier.replace(q, &format!("{}{}", q, q));
        format!("{}{}{}", q, escaped, q)
    }

    /// Quote and join a list of identifiers
    pub fn quote_list(&self, identifiers: &[String]) -> String {
        identifiers
            .iter()
            .map(|ident| self.quote(ident))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Whether DDL participates in transactions on this engine
    pub fn supports_transactional_ddl(&self) -> bool {
        match self {
            SqlDialect::PostgreSQL | SqlDialect::SQLite => true,
            SqlDialect::MySQL => false,
        }
    }

    /// Statement opening a transaction
    pub fn begin_transaction_sql(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL | SqlDialect::SQLite => "BEGIN",
            SqlDialect::MySQL => "START TRANSACTION",
        }
    }

    /// Boolean literal for column defaults
    pub fn boolean_literal(&self, value: bool) -> &'static str {
        match (self, value) {
            (SqlDialect::PostgreSQL, true) => "TRUE",
            (SqlDialect::PostgreSQL, false) => "FALSE",
            (_, true) => "1",
            (_, false) => "0",
        }
    }

    /// Catalog query returning one row when `table` exists
    pub fn has_table_sql(&self) -> String {
        match self {
            SqlDialect::PostgreSQL => "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1"
                .to_string(),
            SqlDialect::MySQL => "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?"
                .to_string(),
            SqlDialect::SQLite => {
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?".to_string()
            }
        }
    }

    /// Catalog query returning one row when `column` exists on `table`
    pub fn has_column_sql(&self) -> String {
        match self {
            SqlDialect::PostgreSQL => "SELECT column_name::text FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2"
                .to_string(),
            SqlDialect::MySQL => "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND table_name = ? AND column_name = ?"
                .to_string(),
            SqlDialect::SQLite => {
                "SELECT name FROM pragma_table_info(?) WHERE name = ?".to_string()
            }
        }
    }

    /// Catalog query returning rows when `index` exists on `table`
    pub fn has_index_sql(&self) -> String {
        match self {
            SqlDialect::PostgreSQL => "SELECT indexname::text FROM pg_indexes \
                 WHERE schemaname = current_schema() AND tablename = $1 AND indexname = $2"
                .to_string(),
            SqlDialect::MySQL => "SELECT index_name FROM information_schema.statistics \
                 WHERE table_schema = DATABASE() AND table_name = ? AND index_name = ?"
                .to_string(),
            SqlDialect::SQLite => "SELECT name FROM sqlite_master \
                 WHERE type = 'index' AND tbl_name = ? AND name = ?"
                .to_string(),
        }
    }

    /// Catalog query listing every user table, one `name` column per row
    pub fn list_tables_sql(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => {
                "SELECT tablename::text AS name FROM pg_tables WHERE schemaname = current_schema()"
            }
            SqlDialect::MySQL => {
                "SELECT table_name AS name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'"
            }
            SqlDialect::SQLite => {
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'"
            }
        }
    }

    /// Statements dropping the given tables regardless of foreign keys
    /// between them. Runs outside any transaction.
    pub fn drop_all_tables_sql(&self, tables: &[String]) -> Vec<String> {
        if tables.is_empty() {
            return Vec::new();
        }

        match self {
            SqlDialect::PostgreSQL => {
                vec![format!("DROP TABLE IF EXISTS {} CASCADE", self.quote_list(tables))]
            }
            SqlDialect::MySQL => {
                let mut statements = vec!["SET FOREIGN_KEY_CHECKS = 0".to_string()];
                statements.push(format!("DROP TABLE IF EXISTS {}", self.quote_list(tables)));
                statements.push("SET FOREIGN_KEY_CHECKS = 1".to_string());
                statements
            }
            SqlDialect::SQLite => {
                let mut statements = vec!["PRAGMA foreign_keys = OFF".to_string()];
                statements.extend(
                    tables
                        .iter()
                        .map(|table| format!("DROP TABLE IF EXISTS {}", self.quote(table))),
                );
                statements.push("PRAGMA foreign_keys = ON".to_string());
                statements
            }
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlDialect::PostgreSQL => write!(f, "postgresql"),
            SqlDialect::MySQL => write!(f, "mysql"),
            SqlDialect::SQLite => write!(f, "sqlite"),
        }
    }
}
