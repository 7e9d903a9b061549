//! Migration Rollback - Handles rolling back applied migrations
//!
//! Reverts whole batches, newest first. Inside a batch units are reverted in
//! reverse discovery order, so a table is dropped before the tables it
//! references. Every ledger record being reverted must belong to a discovered
//! unit; otherwise nothing runs.

use std::collections::HashMap;
use std::time::Instant;

use super::definitions::{MigrationDirection, RollbackResult};
use super::ledger::LedgerSnapshot;
use super::runner::MigrationRunner;
use super::unit::Migration;
use crate::backends::StorageGateway;
use crate::error::{OrmError, OrmResult};

impl MigrationRunner {
    /// Roll back the most recent `steps` batches
    pub async fn rollback(
        &self,
        db: &mut dyn StorageGateway,
        steps: usize,
    ) -> OrmResult<RollbackResult> {
        if steps == 0 {
            return Err(OrmError::Migration(
                "rollback steps must be at least 1".to_string(),
            ));
        }

        let snapshot = self.ledger().snapshot(db).await?;
        let batches: Vec<i64> = snapshot.batches_desc().into_iter().take(steps).collect();
        self.rollback_batches(db, &snapshot, batches).await
    }

    /// Roll back exactly one batch
    pub async fn rollback_batch(
        &self,
        db: &mut dyn StorageGateway,
        batch: i64,
    ) -> OrmResult<RollbackResult> {
        let snapshot = self.ledger().snapshot(db).await?;
        let batches = if snapshot.in_batch(batch).is_empty() {
            tracing::info!(batch, "batch has no applied migrations");
            Vec::new()
        } else {
            vec![batch]
        };
        self.rollback_batches(db, &snapshot, batches).await
    }

    /// Roll back every applied batch, newest first
    pub async fn reset(&self, db: &mut dyn StorageGateway) -> OrmResult<RollbackResult> {
        let snapshot = self.ledger().snapshot(db).await?;
        let batches = snapshot.batches_desc();
        self.rollback_batches(db, &snapshot, batches).await
    }

    async fn rollback_batches(
        &self,
        db: &mut dyn StorageGateway,
        snapshot: &LedgerSnapshot,
        batches: Vec<i64>,
    ) -> OrmResult<RollbackResult> {
        let start_time = Instant::now();
        let units = self.registry().discover()?;

        let positions: HashMap<&str, (usize, &dyn Migration)> = units
            .iter()
            .enumerate()
            .map(|(position, unit)| (unit.name(), (position, *unit)))
            .collect();

        // Plan everything before running any down
        let mut plan: Vec<(i64, &dyn Migration)> = Vec::new();
        for &batch in &batches {
            let mut in_batch = Vec::new();
            for record in snapshot.in_batch(batch) {
                let entry = positions.get(record.name.as_str()).ok_or_else(|| {
                    OrmError::LedgerInconsistency(format!(
                        "migration '{}' (batch {}) is recorded as applied but no such migration exists",
                        record.name, batch
                    ))
                })?;
                in_batch.push(*entry);
            }
            in_batch.sort_by(|a, b| b.0.cmp(&a.0));
            plan.extend(in_batch.into_iter().map(|(_, unit)| (batch, unit)));
        }

        if plan.is_empty() {
            tracing::info!("nothing to rollback");
            return Ok(RollbackResult {
                execution_time_ms: start_time.elapsed().as_millis(),
                ..RollbackResult::default()
            });
        }

        let mut rolled_back = Vec::new();
        for (batch, unit) in plan {
            tracing::info!(migration = unit.name(), batch, "rolling back migration");

            if let Err(source) = self.run_unit(db, unit, MigrationDirection::Down, batch).await {
                tracing::error!(migration = unit.name(), error = %source, "rollback failed");
                return Err(OrmError::RollbackFailed {
                    name: unit.name().to_string(),
                    rolled_back,
                    source: Box::new(source),
                });
            }
            rolled_back.push(unit.name().to_string());
        }

        tracing::info!(count = rolled_back.len(), "migrations rolled back");
        Ok(RollbackResult {
            rolled_back_migrations: rolled_back,
            batches,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }
}
