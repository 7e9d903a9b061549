//! End-to-end runner tests against an in-memory SQLite database

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::*;
use crate::backends::{DatabaseValue, SqliteGateway, StorageGateway};
use crate::error::{OrmError, OrmResult};

struct CreateArtes;

#[async_trait]
impl Migration for CreateArtes {
    fn name(&self) -> &str {
        "001_create_artes"
    }

    async fn up(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db)
            .create("artes", |t| {
                t.id();
                t.string("titulo", 255);
                t.decimal("preco", 10, 2).default(0);
            })
            .await
    }

    async fn down(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db).drop("artes").await
    }
}

struct CreateClientes;

#[async_trait]
impl Migration for CreateClientes {
    fn name(&self) -> &str {
        "002_create_clientes"
    }

    async fn up(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db)
            .create("clientes", |t| {
                t.id();
                t.string("nome", 120);
                t.string("email", 255).nullable();
                t.unique_index("email");
            })
            .await
    }

    async fn down(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db).drop("clientes").await
    }
}

struct CreateVendas;

#[async_trait]
impl Migration for CreateVendas {
    fn name(&self) -> &str {
        "003_create_vendas"
    }

    async fn up(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db)
            .create("vendas", |t| {
                t.id();
                t.foreign_id("arte_id");
                t.decimal("valor", 10, 2);
                t.foreign("arte_id", "artes", "id", ForeignKeyAction::Restrict);
            })
            .await
    }

    async fn down(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db).drop("vendas").await
    }
}

/// Fails on its third statement
struct BrokenMetas;

#[async_trait]
impl Migration for BrokenMetas {
    fn name(&self) -> &str {
        "004_create_metas"
    }

    async fn up(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        db.execute("CREATE TABLE metas (id INTEGER PRIMARY KEY, valor REAL)", &[]).await?;
        db.execute("INSERT INTO metas (valor) VALUES (1000)", &[]).await?;
        db.execute("INSERT INTO metas_inexistente (valor) VALUES (1)", &[]).await?;
        Ok(())
    }

    async fn down(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db).drop_if_exists("metas").await
    }
}

/// Adds `custo` only when it is not there yet
struct AddCustoToArtes;

#[async_trait]
impl Migration for AddCustoToArtes {
    fn name(&self) -> &str {
        "005_add_custo_to_artes"
    }

    async fn up(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        let mut schema = Schema::new(db);
        if schema.has_column("artes", "custo").await? {
            tracing::info!("artes.custo already exists");
            return Ok(());
        }
        schema
            .table("artes", |t| {
                t.decimal("custo", 10, 2).nullable();
            })
            .await
    }

    async fn down(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        Schema::new(db)
            .table("artes", |t| {
                t.drop_column("custo");
            })
            .await
    }
}

/// `down` fails on its second statement
struct ClientesWithBrokenDown;

#[async_trait]
impl Migration for ClientesWithBrokenDown {
    fn name(&self) -> &str {
        "002_create_clientes"
    }

    async fn up(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        CreateClientes.up(db).await
    }

    async fn down(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        db.execute("DROP TABLE clientes", &[]).await?;
        db.execute("DROP TABLE clientes_inexistente", &[]).await?;
        Ok(())
    }
}

/// Records every `up`/`down` invocation of the wrapped unit
struct Recorded<M> {
    inner: M,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl<M: Migration> Migration for Recorded<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn up(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        self.log.lock().unwrap().push(format!("up {}", self.name()));
        self.inner.up(db).await
    }

    async fn down(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        self.log.lock().unwrap().push(format!("down {}", self.name()));
        self.inner.down(db).await
    }
}

/// Collects observer notifications
struct ProgressLog(Arc<Mutex<Vec<String>>>);

impl MigrationObserver for ProgressLog {
    fn applied(&self, name: &str, batch: i64) {
        self.0.lock().unwrap().push(format!("applied {} {}", name, batch));
    }

    fn rolled_back(&self, name: &str, batch: i64) {
        self.0.lock().unwrap().push(format!("rolled back {} {}", name, batch));
    }
}

fn config() -> MigrationConfig {
    MigrationConfig::default()
}

fn core_runner() -> MigrationRunner {
    let mut registry = MigrationRegistry::new();
    registry
        .register(CreateVendas)
        .register(CreateArtes)
        .register(CreateClientes);
    MigrationRunner::new(registry, &config())
}

fn recorded_runner(log: &Arc<Mutex<Vec<String>>>) -> MigrationRunner {
    let mut registry = MigrationRegistry::new();
    registry
        .register(Recorded {
            inner: CreateArtes,
            log: log.clone(),
        })
        .register(Recorded {
            inner: CreateVendas,
            log: log.clone(),
        });
    MigrationRunner::new(registry, &config())
}

async fn user_tables(db: &mut SqliteGateway) -> Vec<String> {
    Schema::new(db)
        .table_names()
        .await
        .unwrap()
        .into_iter()
        .filter(|name| name != "migrations")
        .collect()
}

async fn ledger_names(runner: &MigrationRunner, db: &mut SqliteGateway) -> Vec<(String, i64)> {
    runner
        .ledger()
        .all_applied(db)
        .await
        .unwrap()
        .into_iter()
        .map(|record| (record.name, record.batch))
        .collect()
}

#[tokio::test]
async fn test_migrate_records_all_units_in_one_batch() {
    let mut db = SqliteGateway::in_memory().await.unwrap();
    let runner = core_runner();

    let result = runner.migrate(&mut db).await.unwrap();

    assert_eq!(
        result.applied_migrations,
        vec!["001_create_artes", "002_create_clientes", "003_create_vendas"]
    );
    assert_eq!(result.batches, vec![1]);
    assert_eq!(
        ledger_names(&runner, &mut db).await,
        vec![
            ("001_create_artes".to_string(), 1),
            ("002_create_clientes".to_string(), 1),
            ("003_create_vendas".to_string(), 1),
        ]
    );
    assert_eq!(user_tables(&mut db).await, vec!["artes", "clientes", "vendas"]);
}

#[tokio::test]
async fn test_rollback_restores_empty_schema() {
    let mut db = SqliteGateway::in_memory().await.unwrap();
    let runner = core_runner();

    runner.migrate(&mut db).await.unwrap();
    let result = runner.rollback(&mut db, 1).await.unwrap();

    assert_eq!(
        result.rolled_back_migrations,
        vec!["003_create_vendas", "002_create_clientes", "001_create_artes"]
    );
    assert_eq!(result.batches, vec![1]);
    assert!(user_tables(&mut db).await.is_empty());
    assert!(ledger_names(&runner, &mut db).await.is_empty());
}

#[tokio::test]
async fn test_status_before_and_after_migrate() {
    let mut db = SqliteGateway::in_memory().await.unwrap();
    let runner = core_runner();

    let before = runner.status(&mut db).await.unwrap();
    assert_eq!(before.applied_count(), 0);
    assert_eq!(before.pending_count(), 3);
    // status is read-only
    assert!(!runner.ledger().exists(&mut db).await.unwrap());

    runner.migrate(&mut db).await.unwrap();

    let after = runner.status(&mut db).await.unwrap();
    assert_eq!(after.applied_count(), 3);
    assert_eq!(after.pending_count(), 0);
    assert!(after.orphaned.is_empty());
    assert!(matches!(
        after.migrations[0].status,
        MigrationStatus::Applied { batch: 1, .. }
    ));
}

#[tokio::test]
async fn test_second_migrate_is_noop() {
    let mut db = SqliteGateway::in_memory().await.unwrap();
    let runner = core_runner();

    runner.migrate(&mut db).await.unwrap();
    let before = ledger_names(&runner, &mut db).await;

    let second = runner.migrate(&mut db).await.unwrap();
    assert!(second.nothing_to_migrate());
    assert_eq!(second.skipped_count, 3);
    assert_eq!(ledger_names(&runner, &mut db).await, before);
}

#[tokio::test]
async fn test_failing_unit_is_not_recorded_and_earlier_units_stay() {
    let mut db = SqliteGateway::in_memory().await.unwrap();
    let mut registry = MigrationRegistry::new();
    registry
        .register(CreateArtes)
        .register(CreateClientes)
        .register(BrokenMetas);
    let runner = MigrationRunner::new(registry, &config());

    let err = runner.migrate(&mut db).await.unwrap_err();
    match &err {
        OrmError::MigrationFailed {
            name,
            applied,
            source,
        } => {
            assert_eq!(name, "004_create_metas");
            assert_eq!(applied, &vec!["001_create_artes", "002_create_clientes"]);
            assert!(matches!(**source, OrmError::Statement { .. }));
        }
        other => panic!("Expected MigrationFailed, got {:?}", other),
    }

    assert_eq!(
        ledger_names(&runner, &mut db).await,
        vec![
            ("001_create_artes".to_string(), 1),
            ("002_create_clientes".to_string(), 1),
        ]
    );
    // The unit's own statements were rolled back with it
    assert!(!Schema::new(&mut db).has_table("metas").await.unwrap());
}

#[tokio::test]
async fn test_rollback_drops_referencing_table_first() {
    let mut db = SqliteGateway::in_memory().await.unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let runner = recorded_runner(&log);

    runner.migrate(&mut db).await.unwrap();
    db.execute("INSERT INTO artes (titulo, preco) VALUES (?, ?)", &["Aurora".into(), 1200.0.into()])
        .await
        .unwrap();
    db.execute("INSERT INTO vendas (arte_id, valor) VALUES (?, ?)", &[DatabaseValue::Int64(1), 1200.0.into()])
        .await
        .unwrap();

    runner.rollback(&mut db, 1).await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "up 001_create_artes",
            "up 003_create_vendas",
            "down 003_create_vendas",
            "down 001_create_artes",
        ]
    );
    assert!(user_tables(&mut db).await.is_empty());
}

#[tokio::test]
async fn test_idempotent_unit_invoked_twice_outside_runner() {
    let mut db = SqliteGateway::in_memory().await.unwrap();

    CreateArtes.up(&mut db).await.unwrap();
    AddCustoToArtes.up(&mut db).await.unwrap();
    AddCustoToArtes.up(&mut db).await.unwrap();

    assert!(Schema::new(&mut db).has_column("artes", "custo").await.unwrap());
}

#[tokio::test]
async fn test_step_mode_gives_each_unit_its_own_batch() {
    let mut db = SqliteGateway::in_memory().await.unwrap();
    let runner = core_runner();

    let result = runner
        .migrate_with(&mut db, MigrateOptions { step: true })
        .await
        .unwrap();
    assert_eq!(result.batches, vec![1, 2, 3]);

    let rolled = runner.rollback(&mut db, 1).await.unwrap();
    assert_eq!(rolled.rolled_back_migrations, vec!["003_create_vendas"]);
    assert_eq!(user_tables(&mut db).await, vec!["artes", "clientes"]);

    let rolled = runner.rollback(&mut db, 2).await.unwrap();
    assert_eq!(
        rolled.rolled_back_migrations,
        vec!["002_create_clientes", "001_create_artes"]
    );
    assert_eq!(rolled.batches, vec![2, 1]);
}

#[tokio::test]
async fn test_rollback_specific_batch_and_reset() {
    let mut db = SqliteGateway::in_memory().await.unwrap();

    let mut first = MigrationRegistry::new();
    first.register(CreateArtes);
    MigrationRunner::new(first, &config())
        .migrate(&mut db)
        .await
        .unwrap();

    let runner = core_runner();
    let second = runner.migrate(&mut db).await.unwrap();
    assert_eq!(second.batches, vec![2]);
    assert_eq!(second.skipped_count, 1);

    let rolled = runner.rollback_batch(&mut db, 2).await.unwrap();
    assert_eq!(
        rolled.rolled_back_migrations,
        vec!["003_create_vendas", "002_create_clientes"]
    );
    assert_eq!(user_tables(&mut db).await, vec!["artes"]);

    let nothing = runner.rollback_batch(&mut db, 7).await.unwrap();
    assert_eq!(nothing.rolled_back_count(), 0);

    runner.migrate(&mut db).await.unwrap();
    let reset = runner.reset(&mut db).await.unwrap();
    assert_eq!(reset.rolled_back_count(), 3);
    assert_eq!(reset.batches, vec![2, 1]);
    assert!(user_tables(&mut db).await.is_empty());
}

#[tokio::test]
async fn test_orphaned_record_blocks_rollback() {
    let mut db = SqliteGateway::in_memory().await.unwrap();
    let runner = core_runner();

    runner.migrate(&mut db).await.unwrap();
    runner
        .ledger()
        .record_applied(&mut db, "000_legacy_bootstrap", 1)
        .await
        .unwrap();

    let status = runner.status(&mut db).await.unwrap();
    assert_eq!(status.orphaned.len(), 1);
    assert_eq!(status.orphaned[0].name, "000_legacy_bootstrap");

    let err = runner.rollback(&mut db, 1).await.unwrap_err();
    assert!(matches!(err, OrmError::LedgerInconsistency(_)));
    // No down ran
    assert_eq!(user_tables(&mut db).await, vec!["artes", "clientes", "vendas"]);
}

#[tokio::test]
async fn test_fresh_rebuilds_from_empty_state() {
    let mut db = SqliteGateway::in_memory().await.unwrap();
    let runner = core_runner();

    runner.migrate_with(&mut db, MigrateOptions { step: true }).await.unwrap();
    db.execute("INSERT INTO artes (titulo) VALUES ('Aurora')", &[]).await.unwrap();
    db.execute("CREATE TABLE rascunho (id INTEGER)", &[]).await.unwrap();

    let fresh = runner.fresh(&mut db).await.unwrap();

    assert!(fresh.dropped_tables.contains(&"rascunho".to_string()));
    assert!(fresh.dropped_tables.contains(&"migrations".to_string()));
    assert_eq!(fresh.migration.applied_count(), 3);
    assert_eq!(fresh.migration.batches, vec![1]);
    assert_eq!(user_tables(&mut db).await, vec!["artes", "clientes", "vendas"]);

    let rows = db.query("SELECT COUNT(*) AS total FROM artes", &[]).await.unwrap();
    assert_eq!(rows[0].get::<i64>("total").unwrap(), 0);
}

#[tokio::test]
async fn test_rollback_edge_cases() {
    let mut db = SqliteGateway::in_memory().await.unwrap();
    let runner = core_runner();

    assert!(runner.rollback(&mut db, 0).await.is_err());

    let nothing = runner.rollback(&mut db, 1).await.unwrap();
    assert_eq!(nothing.rolled_back_count(), 0);
    assert!(nothing.batches.is_empty());
}

#[tokio::test]
async fn test_sql_file_units_run_alongside_code_units() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("004_create_metas.sql"),
        "-- Up migration\n\
         CREATE TABLE metas (id INTEGER PRIMARY KEY, ano INTEGER NOT NULL, mes INTEGER NOT NULL, valor REAL NOT NULL);\n\
         -- Down migration\n\
         DROP TABLE metas;\n",
    )
    .unwrap();

    let config = MigrationConfig {
        migrations_dir: dir.path().to_path_buf(),
        ..MigrationConfig::default()
    };
    let files = MigrationManager::with_config(config.clone()).load_migrations().unwrap();

    let mut registry = MigrationRegistry::new();
    registry.register(CreateArtes);
    registry.extend(files.into_iter().map(|unit| Box::new(unit) as Box<dyn Migration>));
    let runner = MigrationRunner::new(registry, &config);

    let mut db = SqliteGateway::in_memory().await.unwrap();
    let result = runner.migrate(&mut db).await.unwrap();
    assert_eq!(result.applied_migrations, vec!["001_create_artes", "004_create_metas"]);
    assert!(Schema::new(&mut db).has_table("metas").await.unwrap());

    runner.rollback(&mut db, 1).await.unwrap();
    assert!(user_tables(&mut db).await.is_empty());
}

#[tokio::test]
async fn test_custom_ledger_table() {
    let mut db = SqliteGateway::in_memory().await.unwrap();
    let config = MigrationConfig {
        migrations_table: "atelie_schema_versions".to_string(),
        ..MigrationConfig::default()
    };
    let mut registry = MigrationRegistry::new();
    registry.register(CreateArtes);
    let runner = MigrationRunner::new(registry, &config);

    runner.migrate(&mut db).await.unwrap();

    let mut schema = Schema::new(&mut db);
    assert!(schema.has_table("atelie_schema_versions").await.unwrap());
    assert!(!schema.has_table("migrations").await.unwrap());
}

#[tokio::test]
async fn test_failed_down_stops_rollback_and_keeps_ledger_consistent() {
    let mut db = SqliteGateway::in_memory().await.unwrap();
    let mut registry = MigrationRegistry::new();
    registry
        .register(CreateArtes)
        .register(ClientesWithBrokenDown)
        .register(CreateVendas);
    let runner = MigrationRunner::new(registry, &config());

    runner.migrate(&mut db).await.unwrap();
    let err = runner.rollback(&mut db, 1).await.unwrap_err();

    match &err {
        OrmError::RollbackFailed {
            name, rolled_back, ..
        } => {
            assert_eq!(name, "002_create_clientes");
            assert_eq!(rolled_back, &vec!["003_create_vendas".to_string()]);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(matches!(err.root_cause(), OrmError::Statement { .. }));

    // The failed unit's own DROP was undone with its transaction
    assert_eq!(
        ledger_names(&runner, &mut db).await,
        vec![
            ("001_create_artes".to_string(), 1),
            ("002_create_clientes".to_string(), 1),
        ]
    );
    assert_eq!(user_tables(&mut db).await, vec!["artes", "clientes"]);
}

#[tokio::test]
async fn test_observer_sees_each_completed_unit() {
    let mut db = SqliteGateway::in_memory().await.unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = MigrationRegistry::new();
    registry
        .register(CreateArtes)
        .register(CreateClientes)
        .register(BrokenMetas);
    let runner = MigrationRunner::new(registry, &config()).with_observer(ProgressLog(log.clone()));

    assert!(runner.migrate(&mut db).await.is_err());
    runner.rollback(&mut db, 1).await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "applied 001_create_artes 1",
            "applied 002_create_clientes 1",
            "rolled back 002_create_clientes 1",
            "rolled back 001_create_artes 1",
        ]
    );
}
