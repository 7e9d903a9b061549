//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the records, reports and configuration shared by the ledger, the
//! runner and the command line front end.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// One applied migration as stored in the ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationRecord {
    /// Unique migration name
    pub name: String,
    /// Batch number (for grouping migrations)
    pub batch: i64,
    /// When the migration was applied
    pub applied_at: DateTime<Utc>,
}

/// Configuration for the migration system
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationConfig {
    /// Directory where `.sql` migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking migrations
    pub migrations_table: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            migrations_table: "migrations".to_string(),
        }
    }
}

/// Options for a migrate invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrateOptions {
    /// Give every pending unit its own batch
    pub step: bool,
}

/// Result of running migrations
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationRunResult {
    /// Names of migrations that were applied, in order
    pub applied_migrations: Vec<String>,
    /// Batches allocated by this run
    pub batches: Vec<i64>,
    /// Number of migrations that were skipped (already applied)
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied_migrations.len()
    }

    pub fn nothing_to_migrate(&self) -> bool {
        self.applied_migrations.is_empty()
    }
}

/// Result of rolling back migrations
#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackResult {
    /// Names of migrations that were rolled back, in execution order
    pub rolled_back_migrations: Vec<String>,
    /// Batches that were rolled back, newest first
    pub batches: Vec<i64>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl RollbackResult {
    pub fn rolled_back_count(&self) -> usize {
        self.rolled_back_migrations.len()
    }
}

/// Result of dropping everything and migrating from scratch
#[derive(Debug, Clone, Default, Serialize)]
pub struct FreshResult {
    pub dropped_tables: Vec<String>,
    pub migration: MigrationRunResult,
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Apply the migration (run `up`)
    Up,
    /// Rollback the migration (run `down`)
    Down,
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Migration is pending (not yet applied)
    Pending,
    /// Migration has been applied
    Applied {
        /// When it was applied
        applied_at: DateTime<Utc>,
        /// Batch number
        batch: i64,
    },
}

/// Status of one discovered unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatusEntry {
    pub name: String,
    #[serde(flatten)]
    pub status: MigrationStatus,
}

impl MigrationStatusEntry {
    pub fn is_applied(&self) -> bool {
        matches!(self.status, MigrationStatus::Applied { .. })
    }
}

/// Status of every discovered unit plus ledger records no unit claims
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    /// One entry per discovered unit, in discovery order
    pub migrations: Vec<MigrationStatusEntry>,
    /// Ledger records whose name matches no discovered unit
    pub orphaned: Vec<MigrationRecord>,
}

impl StatusReport {
    pub fn applied_count(&self) -> usize {
        self.migrations.iter().filter(|entry| entry.is_applied()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.migrations.len() - self.applied_count()
    }
}
