use async_trait::async_trait;
use atelie_orm::{Migration, OrmResult, Schema, StorageGateway};

pub struct CreateClientesTable;

#[async_trait]
impl Migration for CreateClientesTable {
    fn name(&self) -> &str {
        "2024_01_15_000002_create_clientes_table"
    }

    async fn up(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db)
            .create("clientes", |t| {
                t.id();
                t.string("nome", 255);
                t.string("email", 255).nullable();
                t.string("telefone", 30).nullable();
                t.string("cidade", 120).nullable();
                t.text("observacoes").nullable();
                t.timestamps();
                t.unique_index("email");
            })
            .await
    }

    async fn down(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db).drop_if_exists("clientes").await
    }
}
