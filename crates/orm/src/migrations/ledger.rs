//! Migration Ledger - persistent record of applied migrations
//!
//! The ledger table is bootstrapped through the schema builder on first use.
//! The runner reads it once per invocation into a [`LedgerSnapshot`] and plans
//! against that snapshot.

use chrono::{DateTime, NaiveDateTime, Utc};

use super::definitions::MigrationRecord;
use super::schema::Schema;
use super::schema_builder::TableBlueprint;
use crate::backends::{DatabaseRow, DatabaseValue, StorageGateway};
use crate::error::{OrmError, OrmResult};

/// Access to the ledger table
#[derive(Debug, Clone)]
pub struct MigrationLedger {
    table: String,
}

impl MigrationLedger {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Ledger table layout
    pub fn blueprint(&self) -> OrmResult<TableBlueprint> {
        TableBlueprint::create(&self.table, |t| {
            t.id();
            t.string("migration_name", 255);
            t.integer("batch");
            t.timestamp("applied_at").use_current();
            t.unique_index("migration_name");
        })
    }

    pub async fn exists(&self, db: &mut dyn StorageGateway) -> OrmResult<bool> {
        Schema::new(db).has_table(&self.table).await
    }

    /// Create the ledger table if it is absent
    pub async fn ensure_table(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        let mut schema = Schema::new(db);
        if schema.has_table(&self.table).await? {
            return Ok(());
        }

        tracing::info!(table = %self.table, "creating migration ledger table");
        schema.apply(&self.blueprint()?).await
    }

    pub async fn is_applied(&self, db: &mut dyn StorageGateway, name: &str) -> OrmResult<bool> {
        let dialect = db.dialect();
        let sql = format!(
            "SELECT migration_name FROM {} WHERE migration_name = {}",
            dialect.quote(&self.table),
            dialect.parameter_placeholder(0)
        );
        let rows = db.query(&sql, &[DatabaseValue::from(name)]).await?;
        Ok(!rows.is_empty())
    }

    pub async fn record_applied(
        &self,
        db: &mut dyn StorageGateway,
        name: &str,
        batch: i64,
    ) -> OrmResult<()> {
        let dialect = db.dialect();
        let sql = format!(
            "INSERT INTO {} (migration_name, batch, applied_at) VALUES ({}, {}, {})",
            dialect.quote(&self.table),
            dialect.parameter_placeholder(0),
            dialect.parameter_placeholder(1),
            dialect.parameter_placeholder(2)
        );
        let params = [
            DatabaseValue::from(name),
            DatabaseValue::Int32(batch_to_i32(batch)?),
            DatabaseValue::DateTime(Utc::now()),
        ];
        db.execute(&sql, &params).await?;
        Ok(())
    }

    /// Delete the record for `name`; a missing record means the ledger and the
    /// caller disagree.
    pub async fn remove_record(&self, db: &mut dyn StorageGateway, name: &str) -> OrmResult<()> {
        let dialect = db.dialect();
        let sql = format!(
            "DELETE FROM {} WHERE migration_name = {}",
            dialect.quote(&self.table),
            dialect.parameter_placeholder(0)
        );
        let affected = db.execute(&sql, &[DatabaseValue::from(name)]).await?;
        if affected == 0 {
            return Err(OrmError::LedgerInconsistency(format!(
                "no ledger record for migration '{}'",
                name
            )));
        }
        Ok(())
    }

    /// Highest batch number, 0 for an empty ledger
    pub async fn last_batch(&self, db: &mut dyn StorageGateway) -> OrmResult<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX(batch), 0) AS last_batch FROM {}",
            db.dialect().quote(&self.table)
        );
        let rows = db.query(&sql, &[]).await?;
        match rows.first() {
            Some(row) => row.get_by_name("last_batch")?.as_i64().ok_or_else(|| {
                OrmError::Query("last_batch is not an integer".to_string())
            }),
            None => Ok(0),
        }
    }

    /// Names recorded in `batch`, in apply order
    pub async fn applied_in_batch(
        &self,
        db: &mut dyn StorageGateway,
        batch: i64,
    ) -> OrmResult<Vec<String>> {
        let dialect = db.dialect();
        let sql = format!(
            "SELECT migration_name FROM {} WHERE batch = {} ORDER BY applied_at, id",
            dialect.quote(&self.table),
            dialect.parameter_placeholder(0)
        );
        let rows = db.query(&sql, &[DatabaseValue::Int32(batch_to_i32(batch)?)]).await?;
        rows.iter().map(|row| row.get::<String>("migration_name")).collect()
    }

    /// Every record, in apply order
    pub async fn all_applied(&self, db: &mut dyn StorageGateway) -> OrmResult<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT migration_name, batch, applied_at FROM {} ORDER BY applied_at, id",
            db.dialect().quote(&self.table)
        );
        let rows = db.query(&sql, &[]).await?;
        rows.iter().map(record_from_row).collect()
    }

    /// Fresh read of the whole ledger; empty when the table does not exist yet
    pub async fn snapshot(&self, db: &mut dyn StorageGateway) -> OrmResult<LedgerSnapshot> {
        if !self.exists(db).await? {
            return Ok(LedgerSnapshot::default());
        }
        Ok(LedgerSnapshot::new(self.all_applied(db).await?))
    }
}

fn batch_to_i32(batch: i64) -> OrmResult<i32> {
    i32::try_from(batch)
        .map_err(|_| OrmError::LedgerInconsistency(format!("batch {} out of range", batch)))
}

fn record_from_row(row: &DatabaseRow) -> OrmResult<MigrationRecord> {
    let name: String = row.get("migration_name")?;
    let batch = row
        .get_by_name("batch")?
        .as_i64()
        .ok_or_else(|| OrmError::Query(format!("batch of '{}' is not an integer", name)))?;
    let applied_at = parse_timestamp(row.get_by_name("applied_at")?).ok_or_else(|| {
        OrmError::Query(format!("applied_at of '{}' is not a timestamp", name))
    })?;

    Ok(MigrationRecord {
        name,
        batch,
        applied_at,
    })
}

/// Engines without a native timestamp type hand back text
fn parse_timestamp(value: &DatabaseValue) -> Option<DateTime<Utc>> {
    match value {
        DatabaseValue::DateTime(dt) => Some(*dt),
        DatabaseValue::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                    .iter()
                    .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                    .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
            }),
        _ => None,
    }
}

/// Point-in-time copy of the ledger
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerSnapshot {
    records: Vec<MigrationRecord>,
}

impl LedgerSnapshot {
    pub fn new(records: Vec<MigrationRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[MigrationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&MigrationRecord> {
        self.records.iter().find(|record| record.name == name)
    }

    pub fn is_applied(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn last_batch(&self) -> i64 {
        self.records.iter().map(|record| record.batch).max().unwrap_or(0)
    }

    /// Distinct batch numbers, newest first
    pub fn batches_desc(&self) -> Vec<i64> {
        let mut batches: Vec<i64> = self.records.iter().map(|record| record.batch).collect();
        batches.sort_unstable_by(|a, b| b.cmp(a));
        batches.dedup();
        batches
    }

    /// Records of one batch, in apply order
    pub fn in_batch(&self, batch: i64) -> Vec<&MigrationRecord> {
        self.records.iter().filter(|record| record.batch == batch).collect()
    }
}
