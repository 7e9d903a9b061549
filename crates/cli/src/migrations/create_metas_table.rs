use async_trait::async_trait;
use atelie_orm::{Migration, OrmResult, Schema, StorageGateway};

/// Monthly sales targets, one per (ano, mes)
pub struct CreateMetasTable;

#[async_trait]
impl Migration for CreateMetasTable {
    fn name(&self) -> &str {
        "2024_01_15_000004_create_metas_table"
    }

    async fn up(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db)
            .create("metas", |t| {
                t.id();
                t.integer("ano");
                t.integer("mes");
                t.decimal("valor_meta", 12, 2);
                t.string("descricao", 255).nullable();
                t.timestamps();
                t.unique(&["ano", "mes"]);
            })
            .await
    }

    async fn down(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db).drop_if_exists("metas").await
    }
}
