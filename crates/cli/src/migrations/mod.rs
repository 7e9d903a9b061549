//! The application's own schema history

mod add_custo_to_artes_table;
mod create_artes_table;
mod create_clientes_table;
mod create_metas_table;
mod create_vendas_table;

pub use add_custo_to_artes_table::AddCustoToArtesTable;
pub use create_artes_table::CreateArtesTable;
pub use create_clientes_table::CreateClientesTable;
pub use create_metas_table::CreateMetasTable;
pub use create_vendas_table::CreateVendasTable;

use atelie_orm::{MigrationConfig, MigrationManager, MigrationRegistry, OrmResult};

/// Registry holding only the built-in units
pub fn builtin() -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    registry
        .register(CreateArtesTable)
        .register(CreateClientesTable)
        .register(CreateVendasTable)
        .register(CreateMetasTable)
        .register(AddCustoToArtesTable);
    registry
}

/// Built-in units plus every `.sql` file in the configured directory
pub fn registry(config: &MigrationConfig) -> OrmResult<MigrationRegistry> {
    let mut registry = builtin();
    let files = MigrationManager::with_config(config.clone()).load_migrations()?;
    tracing::debug!(
        count = files.len(),
        dir = %config.migrations_dir.display(),
        "loaded migration files"
    );
    for unit in files {
        registry.register(unit);
    }
    Ok(registry)
}
