use async_trait::async_trait;
use atelie_orm::{Migration, OrmError, OrmResult, Schema, StorageGateway};

/// Production cost of an artwork. `up` probes the catalog first: some
/// databases received the column by hand before this unit existed. `down`
/// only runs when the ledger says the column was added, so a missing column
/// there is reported instead of skipped.
pub struct AddCustoToArtesTable;

#[async_trait]
impl Migration for AddCustoToArtesTable {
    fn name(&self) -> &str {
        "2024_03_02_000001_add_custo_to_artes_table"
    }

    async fn up(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        let mut schema = Schema::new(db);
        if schema.has_column("artes", "custo").await? {
            tracing::info!(migration = self.name(), "artes.custo already exists, skipping");
            return Ok(());
        }

        schema
            .table("artes", |t| {
                t.decimal("custo", 10, 2).nullable();
            })
            .await
    }

    async fn down(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        let mut schema = Schema::new(db);
        if !schema.has_column("artes", "custo").await? {
            return Err(OrmError::LedgerInconsistency(format!(
                "{} is recorded as applied but artes.custo does not exist",
                self.name()
            )));
        }

        schema
            .table("artes", |t| {
                t.drop_column("custo");
            })
            .await
    }
}
