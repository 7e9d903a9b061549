//! Error types for the ORM system
//!
//! Provides the error taxonomy shared by the schema builder, the storage
//! gateways, the migration ledger and the migration runner.

use crate::backends::DatabaseValue;

/// ORM result type alias
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for ORM operations
#[derive(Debug, thiserror::Error)]
pub enum OrmError {
    /// Malformed blueprint: duplicate column, undefined column reference,
    /// more than one primary key, or a change the dialect cannot express
    #[error("Schema error: {0}")]
    Schema(String),

    /// A statement was rejected by the database engine
    #[error("Statement failed: {source}\n  statement: {statement}\n  params: {params:?}")]
    Statement {
        statement: String,
        params: Vec<DatabaseValue>,
        #[source]
        source: sqlx::Error,
    },

    /// The ledger disagrees with what a unit or the registry can observe
    #[error("Ledger inconsistency: {0}")]
    LedgerInconsistency(String),

    /// A unit failed while migrating; `applied` lists the units recorded
    /// earlier in the same invocation
    #[error("Migration {name} failed: {source}")]
    MigrationFailed {
        name: String,
        applied: Vec<String>,
        #[source]
        source: Box<OrmError>,
    },

    /// A unit failed while rolling back; `rolled_back` lists the units
    /// reverted earlier in the same invocation
    #[error("Rollback of {name} failed: {source}")]
    RollbackFailed {
        name: String,
        rolled_back: Vec<String>,
        #[source]
        source: Box<OrmError>,
    },

    /// Discovery or registry error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Row decoding or result shape error
    #[error("Query error: {0}")]
    Query(String),

    /// Filesystem error while reading or writing migration files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrmError {
    /// Wrap a driver error together with the statement that caused it
    pub fn statement(statement: &str, params: &[DatabaseValue], source: sqlx::Error) -> Self {
        OrmError::Statement {
            statement: statement.to_string(),
            params: params.to_vec(),
            source,
        }
    }

    /// Name of the migration unit this error is attached to, if any
    pub fn migration_name(&self) -> Option<&str> {
        match self {
            OrmError::MigrationFailed { name, .. } | OrmError::RollbackFailed { name, .. } => {
                Some(name)
            }
            _ => None,
        }
    }

    /// The innermost error, looking through unit-level wrappers
    pub fn root_cause(&self) -> &OrmError {
        match self {
            OrmError::MigrationFailed { source, .. } | OrmError::RollbackFailed { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}
