use async_trait::async_trait;
use atelie_orm::{ForeignKeyAction, Migration, OrmResult, Schema, StorageGateway};

/// Sales. A sold artwork cannot be deleted; deleting a client keeps the
/// sale with no client attached.
pub struct CreateVendasTable;

#[async_trait]
impl Migration for CreateVendasTable {
    fn name(&self) -> &str {
        "2024_01_15_000003_create_vendas_table"
    }

    async fn up(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db)
            .create("vendas", |t| {
                t.id();
                t.foreign_id("arte_id");
                t.foreign_id("cliente_id").nullable();
                t.decimal("valor", 10, 2);
                t.date("data_venda");
                t.enumeration(
                    "forma_pagamento",
                    &["pix", "dinheiro", "cartao", "transferencia"],
                )
                .default("pix");
                t.timestamps();
                t.foreign("arte_id", "artes", "id", ForeignKeyAction::Restrict);
                t.foreign("cliente_id", "clientes", "id", ForeignKeyAction::SetNull);
                t.index("data_venda");
            })
            .await
    }

    async fn down(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db).drop_if_exists("vendas").await
    }
}
