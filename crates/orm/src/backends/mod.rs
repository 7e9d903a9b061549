//! Database Backend Abstractions
//!
//! This module provides the storage gateway implementations for the database
//! engines the migration engine supports (PostgreSQL, MySQL, SQLite), all
//! backed by sqlx, and picks one from a database URL.

pub mod core;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

// Re-export core traits and types
pub use self::core::*;
pub use mysql::MySqlGateway;
pub use postgres::PostgresGateway;
pub use sqlite::SqliteGateway;

use crate::error::{OrmError, OrmResult};

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl DatabaseBackendType {
    /// Detect database backend type from URL
    pub fn from_url(url: &str) -> OrmResult<Self> {
        if url.starts_with("postgresql://") || url.starts_with("postgres://") {
            Ok(DatabaseBackendType::PostgreSQL)
        } else if url.starts_with("mysql://") || url.starts_with("mariadb://") {
            Ok(DatabaseBackendType::MySQL)
        } else if url.starts_with("sqlite:") || url.starts_with("file:") {
            Ok(DatabaseBackendType::SQLite)
        } else {
            Err(OrmError::Connection(format!(
                "Unable to detect database backend from URL: {}",
                mask_database_url(url)
            )))
        }
    }

    /// SQL dialect spoken by this backend
    pub fn sql_dialect(&self) -> SqlDialect {
        match self {
            DatabaseBackendType::PostgreSQL => SqlDialect::PostgreSQL,
            DatabaseBackendType::MySQL => SqlDialect::MySQL,
            DatabaseBackendType::SQLite => SqlDialect::SQLite,
        }
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sql_dialect())
    }
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseBackendType::PostgreSQL),
            "mysql" | "mariadb" => Ok(DatabaseBackendType::MySQL),
            "sqlite" => Ok(DatabaseBackendType::SQLite),
            _ => Err(OrmError::Configuration(format!(
                "Unsupported database backend: {}",
                s
            ))),
        }
    }
}

/// Open a storage gateway for the given database URL
pub async fn connect(database_url: &str) -> OrmResult<Box<dyn StorageGateway>> {
    let gateway: Box<dyn StorageGateway> = match DatabaseBackendType::from_url(database_url)? {
        DatabaseBackendType::PostgreSQL => Box::new(PostgresGateway::connect(database_url).await?),
        DatabaseBackendType::MySQL => Box::new(MySqlGateway::connect(database_url).await?),
        DatabaseBackendType::SQLite => Box::new(SqliteGateway::connect(database_url).await?),
    };

    tracing::debug!(
        dialect = %gateway.dialect(),
        url = %mask_database_url(database_url),
        "opened storage gateway"
    );
    Ok(gateway)
}

/// Replace the password of a database URL for display
pub fn mask_database_url(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => database_url.to_string(),
    }
}
