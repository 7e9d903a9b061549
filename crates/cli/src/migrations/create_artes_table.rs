use async_trait::async_trait;
use atelie_orm::{Migration, OrmResult, Schema, StorageGateway};

/// Catalogue of artworks
pub struct CreateArtesTable;

#[async_trait]
impl Migration for CreateArtesTable {
    fn name(&self) -> &str {
        "2024_01_15_000001_create_artes_table"
    }

    async fn up(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db)
            .create("artes", |t| {
                t.id();
                t.string("titulo", 255);
                t.string("tecnica", 120).nullable();
                t.string("dimensoes", 60).nullable();
                t.integer("ano").nullable();
                t.decimal("preco", 10, 2).default(0);
                t.enumeration("status", &["disponivel", "reservada", "vendida"])
                    .default("disponivel");
                t.text("descricao").nullable();
                t.timestamps();
                t.index("status");
            })
            .await
    }

    async fn down(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db).drop_if_exists("artes").await
    }
}
