//! Migration Runner - Executes migrations against the database
//!
//! Plans every invocation against a fresh ledger snapshot, applies pending
//! units in discovery order and records each one as it succeeds. A failing
//! unit stops the run; units recorded before it stay recorded.

use std::collections::HashSet;
use std::time::Instant;

use super::definitions::{
    FreshResult, MigrateOptions, MigrationConfig, MigrationDirection, MigrationRunResult,
    MigrationStatus, MigrationStatusEntry, StatusReport,
};
use super::ledger::MigrationLedger;
use super::observer::MigrationObserver;
use super::registry::MigrationRegistry;
use super::schema::Schema;
use super::unit::Migration;
use crate::backends::StorageGateway;
use crate::error::{OrmError, OrmResult};

/// Migration runner that executes migrations against a database
pub struct MigrationRunner {
    registry: MigrationRegistry,
    ledger: MigrationLedger,
    observers: Vec<Box<dyn MigrationObserver>>,
}

impl MigrationRunner {
    /// Create a new migration runner
    pub fn new(registry: MigrationRegistry, config: &MigrationConfig) -> Self {
        Self {
            registry,
            ledger: MigrationLedger::new(config.migrations_table.clone()),
            observers: Vec::new(),
        }
    }

    /// Notify `observer` as each unit completes
    pub fn with_observer<O>(mut self, observer: O) -> Self
    where
        O: MigrationObserver + 'static,
    {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &MigrationLedger {
        &self.ledger
    }

    /// Run all pending migrations in one batch
    pub async fn migrate(&self, db: &mut dyn StorageGateway) -> OrmResult<MigrationRunResult> {
        self.migrate_with(db, MigrateOptions::default()).await
    }

    /// Run all pending migrations
    pub async fn migrate_with(
        &self,
        db: &mut dyn StorageGateway,
        options: MigrateOptions,
    ) -> OrmResult<MigrationRunResult> {
        let start_time = Instant::now();
        let units = self.registry.discover()?;

        self.ledger.ensure_table(db).await?;
        let snapshot = self.ledger.snapshot(db).await?;

        let pending: Vec<&dyn Migration> = units
            .into_iter()
            .filter(|unit| !snapshot.is_applied(unit.name()))
            .collect();

        if pending.is_empty() {
            tracing::info!("nothing to migrate");
            return Ok(MigrationRunResult {
                skipped_count: snapshot.len(),
                execution_time_ms: start_time.elapsed().as_millis(),
                ..MigrationRunResult::default()
            });
        }

        let mut batch = snapshot.last_batch() + 1;
        let mut applied = Vec::new();
        let mut batches = Vec::new();

        for unit in pending {
            tracing::info!(migration = unit.name(), batch, "applying migration");

            if let Err(source) = self.run_unit(db, unit, MigrationDirection::Up, batch).await {
                tracing::error!(migration = unit.name(), error = %source, "migration failed");
                return Err(OrmError::MigrationFailed {
                    name: unit.name().to_string(),
                    applied,
                    source: Box::new(source),
                });
            }

            applied.push(unit.name().to_string());
            if batches.last() != Some(&batch) {
                batches.push(batch);
            }
            if options.step {
                batch += 1;
            }
        }

        tracing::info!(count = applied.len(), "migrations applied");
        Ok(MigrationRunResult {
            applied_migrations: applied,
            batches,
            skipped_count: snapshot.len(),
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Applied/pending state of every discovered unit. Does not create the
    /// ledger table.
    pub async fn status(&self, db: &mut dyn StorageGateway) -> OrmResult<StatusReport> {
        let units = self.registry.discover()?;
        let snapshot = self.ledger.snapshot(db).await?;

        let migrations = units
            .iter()
            .map(|unit| MigrationStatusEntry {
                name: unit.name().to_string(),
                status: match snapshot.get(unit.name()) {
                    Some(record) => MigrationStatus::Applied {
                        applied_at: record.applied_at,
                        batch: record.batch,
                    },
                    None => MigrationStatus::Pending,
                },
            })
            .collect();

        let known: HashSet<&str> = units.iter().map(|unit| unit.name()).collect();
        let orphaned = snapshot
            .records()
            .iter()
            .filter(|record| !known.contains(record.name.as_str()))
            .cloned()
            .collect();

        Ok(StatusReport {
            migrations,
            orphaned,
        })
    }

    /// Drop every table, ledger included, without running any `down`, then
    /// migrate from an empty database
    pub async fn fresh(&self, db: &mut dyn StorageGateway) -> OrmResult<FreshResult> {
        // Refuse before dropping anything if the units cannot be planned
        self.registry.discover()?;

        let dropped_tables = Schema::new(db).drop_all_tables().await?;
        let migration = self.migrate(db).await?;

        Ok(FreshResult {
            dropped_tables,
            migration,
        })
    }

    /// Run one direction of a unit together with its ledger write, then
    /// notify observers. Where the engine runs DDL transactionally the unit
    /// and its ledger write share one transaction.
    pub(crate) async fn run_unit(
        &self,
        db: &mut dyn StorageGateway,
        unit: &dyn Migration,
        direction: MigrationDirection,
        batch: i64,
    ) -> OrmResult<()> {
        self.execute_unit(db, unit, direction, batch).await?;

        for observer in &self.observers {
            match direction {
                MigrationDirection::Up => observer.applied(unit.name(), batch),
                MigrationDirection::Down => observer.rolled_back(unit.name(), batch),
            }
        }
        Ok(())
    }

    async fn execute_unit(
        &self,
        db: &mut dyn StorageGateway,
        unit: &dyn Migration,
        direction: MigrationDirection,
        batch: i64,
    ) -> OrmResult<()> {
        if !db.dialect().supports_transactional_ddl() {
            let outcome = self.run_unit_body(db, unit, direction, batch).await;
            if outcome.is_err() {
                tracing::warn!(
                    migration = unit.name(),
                    "{} cannot roll back DDL; statements before the failure remain applied",
                    db.dialect()
                );
            }
            return outcome;
        }

        db.begin().await?;
        match self.run_unit_body(db, unit, direction, batch).await {
            Ok(()) => db.commit().await,
            Err(e) => {
                if let Err(rollback_error) = db.rollback().await {
                    tracing::error!(
                        migration = unit.name(),
                        error = %rollback_error,
                        "failed to roll back transaction"
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_unit_body(
        &self,
        db: &mut dyn StorageGateway,
        unit: &dyn Migration,
        direction: MigrationDirection,
        batch: i64,
    ) -> OrmResult<()> {
        match direction {
            MigrationDirection::Up => {
                unit.up(db).await?;
                self.ledger.record_applied(db, unit.name(), batch).await
            }
            MigrationDirection::Down => {
                unit.down(db).await?;
                self.ledger.remove_record(db, unit.name()).await
            }
        }
    }
}
