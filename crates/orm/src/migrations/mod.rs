//! Migration System
//!
//! Schema builder, migration units, the ledger and the runner that ties them
//! together.

pub mod definitions;
pub mod ledger;
pub mod manager;
pub mod observer;
pub mod registry;
pub mod rollback;
pub mod runner;
pub mod schema;
pub mod schema_builder;
pub mod unit;

#[cfg(test)]
mod tests;

pub use definitions::*;
pub use ledger::{LedgerSnapshot, MigrationLedger};
pub use manager::{split_sql_statements, MigrationManager};
pub use observer::MigrationObserver;
pub use registry::{ordering_prefix, MigrationRegistry};
pub use runner::MigrationRunner;
pub use schema::Schema;
pub use schema_builder::*;
pub use unit::{Migration, SqlMigration};
