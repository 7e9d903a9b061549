//! # atelie-orm: schema migrations for the atelie business application
//!
//! Evolves the relational schema behind artes, clientes, vendas and metas in
//! lockstep with application releases.
//!
//! - [`backends`]: the storage gateway and its sqlx-backed PostgreSQL, MySQL
//!   and SQLite implementations
//! - [`migrations`]: the schema builder, migration units, the ledger and the
//!   runner (`migrate`, `rollback`, `reset`, `fresh`, `status`)

pub mod backends;
pub mod error;
pub mod migrations;

pub use backends::{
    connect, mask_database_url, DatabaseBackendType, DatabaseRow, DatabaseValue, SqlDialect,
    StorageGateway,
};
pub use error::{OrmError, OrmResult};
pub use migrations::*;
