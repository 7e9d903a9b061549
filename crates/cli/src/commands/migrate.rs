//! `atelie migrate` and its subcommands

use anyhow::Context;
use atelie_orm::{
    connect, mask_database_url, MigrateOptions, MigrationManager, MigrationObserver,
    MigrationRunResult, MigrationRunner, MigrationStatus, OrmError, OrmResult, RollbackResult,
    StatusReport, StorageGateway,
};
use console::style;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config::Settings;
use crate::migrations;

/// Prints one line per unit as soon as it completes
struct ProgressPrinter;

impl MigrationObserver for ProgressPrinter {
    fn applied(&self, name: &str, _batch: i64) {
        println!("  {} {}", style("✓").green(), name);
    }

    fn rolled_back(&self, name: &str, _batch: i64) {
        println!("  {} {}", style("✓").green(), name);
    }
}

/// One open connection plus the runner built from the configured registry
struct Session {
    db: Box<dyn StorageGateway>,
    runner: MigrationRunner,
}

impl Session {
    async fn open(settings: &Settings) -> anyhow::Result<Self> {
        let url = settings.require_database_url()?;
        let registry =
            migrations::registry(&settings.migrations).context("failed to load migrations")?;

        println!("{} {}", style("Database:").bold(), mask_database_url(url));
        let db = connect(url)
            .await
            .with_context(|| format!("failed to connect to {}", mask_database_url(url)))?;

        Ok(Self {
            db,
            runner: MigrationRunner::new(registry, &settings.migrations)
                .with_observer(ProgressPrinter),
        })
    }

    /// Close the connection, keeping the command's own error if it has one
    async fn finish<T>(self, outcome: anyhow::Result<T>) -> anyhow::Result<T> {
        let closed = self
            .db
            .close()
            .await
            .context("failed to close database connection");
        let value = outcome?;
        closed?;
        Ok(value)
    }

    async fn pending_names(&mut self) -> anyhow::Result<Vec<String>> {
        let report = self.runner.status(self.db.as_mut()).await?;
        Ok(report
            .migrations
            .into_iter()
            .filter(|entry| !entry.is_applied())
            .map(|entry| entry.name)
            .collect())
    }
}

/// Apply every pending migration
pub async fn run(settings: &Settings, step: bool) -> anyhow::Result<()> {
    let mut session = Session::open(settings).await?;
    let outcome = async {
        let pending = session.pending_names().await?;
        let result = session
            .runner
            .migrate_with(session.db.as_mut(), MigrateOptions { step })
            .await;
        report_migrate(&pending, result)
    }
    .await;
    session.finish(outcome).await
}

/// Drop every table and migrate from scratch
pub async fn fresh(settings: &Settings, force: bool) -> anyhow::Result<()> {
    if !confirm_destructive_operation(settings, "migrate fresh", force).await? {
        println!("Operation cancelled");
        return Ok(());
    }

    let mut session = Session::open(settings).await?;
    let outcome = async {
        let pending: Vec<String> = session
            .runner
            .registry()
            .discover()?
            .iter()
            .map(|unit| unit.name().to_string())
            .collect();

        let result = session.runner.fresh(session.db.as_mut()).await.map(|fresh| {
            println!(
                "{} dropped {} table(s)",
                style("✓").green(),
                fresh.dropped_tables.len()
            );
            fresh.migration
        });
        report_migrate(&pending, result)
    }
    .await;
    session.finish(outcome).await
}

/// Roll back the last `steps` batches, or exactly `batch`
pub async fn rollback(settings: &Settings, steps: usize, batch: Option<i64>) -> anyhow::Result<()> {
    let mut session = Session::open(settings).await?;
    let result = match batch {
        Some(batch) => session.runner.rollback_batch(session.db.as_mut(), batch).await,
        None => session.runner.rollback(session.db.as_mut(), steps).await,
    };
    let outcome = report_rollback(result);
    session.finish(outcome).await
}

/// Roll back every applied migration
pub async fn reset(settings: &Settings, force: bool) -> anyhow::Result<()> {
    if !confirm_destructive_operation(settings, "migrate reset", force).await? {
        println!("Operation cancelled");
        return Ok(());
    }

    let mut session = Session::open(settings).await?;
    let result = session.runner.reset(session.db.as_mut()).await;
    let outcome = report_rollback(result);
    session.finish(outcome).await
}

/// Print the state of every known migration
pub async fn status(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let mut session = Session::open(settings).await?;
    let outcome = async {
        let report = session.runner.status(session.db.as_mut()).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_status(&report);
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;
    session.finish(outcome).await
}

/// Scaffold a new SQL migration file
pub fn make(settings: &Settings, name: &str) -> anyhow::Result<()> {
    let path = MigrationManager::with_config(settings.migrations.clone())
        .create_migration(name)
        .with_context(|| format!("failed to create migration '{}'", name))?;

    println!("{} Created migration: {}", style("✓").green(), path.display());
    Ok(())
}

fn report_migrate(pending: &[String], result: OrmResult<MigrationRunResult>) -> anyhow::Result<()> {
    match result {
        Ok(result) => {
            if result.nothing_to_migrate() {
                println!("{}", style("Nothing to migrate.").green());
                return Ok(());
            }

            println!();
            println!(
                "{} Applied {} migration(s) in {} ({} ms)",
                style("Done.").green().bold(),
                result.applied_count(),
                describe_batches(&result.batches),
                result.execution_time_ms
            );
            Ok(())
        }
        Err(OrmError::MigrationFailed {
            name,
            applied,
            source,
        }) => {
            println!("  {} {}", style("✗").red(), name);
            println!("      {}", style(&source).red());

            let skipped: Vec<&String> = pending
                .iter()
                .skip_while(|candidate| **candidate != name)
                .skip(1)
                .collect();
            for candidate in &skipped {
                println!("  {} {} {}", style("-").dim(), candidate, style("(skipped)").dim());
            }

            println!();
            println!(
                "{} {} applied, 1 failed, {} skipped",
                style("Failed.").red().bold(),
                applied.len(),
                skipped.len()
            );
            Err(anyhow::Error::new(*source).context(format!("migration {} failed", name)))
        }
        Err(e) => Err(e.into()),
    }
}

fn report_rollback(result: OrmResult<RollbackResult>) -> anyhow::Result<()> {
    match result {
        Ok(result) => {
            if result.rolled_back_count() == 0 {
                println!("{}", style("Nothing to rollback.").green());
                return Ok(());
            }

            println!();
            println!(
                "{} Rolled back {} migration(s) from {} ({} ms)",
                style("Done.").green().bold(),
                result.rolled_back_count(),
                describe_batches(&result.batches),
                result.execution_time_ms
            );
            Ok(())
        }
        Err(OrmError::RollbackFailed {
            name,
            rolled_back,
            source,
        }) => {
            println!("  {} {}", style("✗").red(), name);
            println!("      {}", style(&source).red());

            println!();
            println!(
                "{} {} rolled back, 1 failed; remaining migrations stay applied",
                style("Failed.").red().bold(),
                rolled_back.len()
            );
            Err(anyhow::Error::new(*source).context(format!("rollback of {} failed", name)))
        }
        Err(e) => Err(e.into()),
    }
}

fn print_status(report: &StatusReport) {
    if report.migrations.is_empty() {
        println!("No migrations found");
    }

    let width = report
        .migrations
        .iter()
        .map(|entry| entry.name.len())
        .max()
        .unwrap_or(0)
        .max("Migration".len());

    println!("  {:<width$}  {:>5}  {}", "Migration", "Batch", "Applied at", width = width);
    for entry in &report.migrations {
        match &entry.status {
            MigrationStatus::Applied { applied_at, batch } => println!(
                "{} {:<width$}  {:>5}  {}",
                style("✓").green(),
                entry.name,
                batch,
                applied_at.format("%Y-%m-%d %H:%M:%S"),
                width = width
            ),
            MigrationStatus::Pending => println!(
                "{} {:<width$}  {:>5}  {}",
                style("⏳").yellow(),
                entry.name,
                "-",
                style("pending").yellow(),
                width = width
            ),
        }
    }

    println!();
    println!(
        "{} applied, {} pending",
        report.applied_count(),
        report.pending_count()
    );

    if !report.orphaned.is_empty() {
        println!();
        println!(
            "{} {} recorded migration(s) have no matching unit; rollback will refuse to touch their batches:",
            style("WARNING:").yellow().bold(),
            report.orphaned.len()
        );
        for record in &report.orphaned {
            println!("  {} (batch {})", record.name, record.batch);
        }
    }
}

fn describe_batches(batches: &[i64]) -> String {
    match batches {
        [] => "no batch".to_string(),
        [only] => format!("batch {}", only),
        [first, .., last] => {
            let (low, high) = if first <= last { (first, last) } else { (last, first) };
            format!("batches {}-{}", low, high)
        }
    }
}

async fn confirm_destructive_operation(
    settings: &Settings,
    operation: &str,
    force: bool,
) -> anyhow::Result<bool> {
    if force || !settings.environment.is_production() {
        return Ok(true);
    }

    println!(
        "{} Running {} in the {} environment!",
        style("WARNING:").yellow().bold(),
        operation,
        settings.environment
    );
    println!("   This operation will permanently delete data.");

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(b"   Are you sure you want to continue? (y/N): ")
        .await?;
    stdout.flush().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let response = lines
        .next_line()
        .await?
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    Ok(matches!(response.as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use atelie_orm::{MigrationConfig, Schema};
    use std::path::Path;

    fn settings_in(dir: &Path) -> Settings {
        Settings {
            database_url: Some(format!("sqlite://{}", dir.join("atelie.db").display())),
            migrations: MigrationConfig {
                migrations_dir: dir.join("migrations"),
                ..MigrationConfig::default()
            },
            environment: Environment::Testing,
        }
    }

    async fn open(settings: &Settings) -> Box<dyn StorageGateway> {
        connect(settings.database_url.as_deref().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn test_run_status_and_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());

        status(&settings, false).await.unwrap();
        run(&settings, false).await.unwrap();
        run(&settings, false).await.unwrap();
        status(&settings, true).await.unwrap();

        let mut db = open(&settings).await;
        assert!(Schema::new(db.as_mut()).has_table("vendas").await.unwrap());
        db.close().await.unwrap();

        rollback(&settings, 1, None).await.unwrap();

        let mut db = open(&settings).await;
        assert!(!Schema::new(db.as_mut()).has_table("artes").await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_step_then_rollback_batch_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());

        run(&settings, true).await.unwrap();
        rollback(&settings, 1, Some(5)).await.unwrap();

        let mut db = open(&settings).await;
        assert!(!Schema::new(db.as_mut()).has_column("artes", "custo").await.unwrap());
        assert!(Schema::new(db.as_mut()).has_table("metas").await.unwrap());
        db.close().await.unwrap();

        reset(&settings, false).await.unwrap();

        let mut db = open(&settings).await;
        assert_eq!(Schema::new(db.as_mut()).table_names().await.unwrap(), vec!["migrations"]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_file_migration_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        std::fs::create_dir_all(&settings.migrations.migrations_dir).unwrap();
        std::fs::write(
            settings.migrations.migrations_dir.join("2024_05_01_000000_create_exposicoes.sql"),
            "-- up\nCREATE TABLE exposicoes (id INTEGER PRIMARY KEY);\nINSERT INTO inexistente VALUES (1);\n-- down\nDROP TABLE exposicoes;\n",
        )
        .unwrap();

        let err = run(&settings, false).await.unwrap_err();
        assert!(format!("{:#}", err).contains("2024_05_01_000000_create_exposicoes"));

        let mut db = open(&settings).await;
        assert!(Schema::new(db.as_mut()).has_table("artes").await.unwrap());
        assert!(!Schema::new(db.as_mut()).has_table("exposicoes").await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_fresh_rebuilds_schema() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());

        run(&settings, false).await.unwrap();
        let mut db = open(&settings).await;
        db.execute("CREATE TABLE rascunho (id INTEGER)", &[]).await.unwrap();
        db.close().await.unwrap();

        fresh(&settings, false).await.unwrap();

        let mut db = open(&settings).await;
        let mut schema = Schema::new(db.as_mut());
        assert!(!schema.has_table("rascunho").await.unwrap());
        assert!(schema.has_table("artes").await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_make_scaffolds_file_and_missing_url_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(dir.path());

        make(&settings, "create exposicoes").unwrap();
        let files: Vec<_> = std::fs::read_dir(&settings.migrations.migrations_dir)
            .unwrap()
            .collect();
        assert_eq!(files.len(), 1);

        settings.database_url = None;
        assert!(run(&settings, false).await.is_err());
    }

    #[test]
    fn test_describe_batches() {
        assert_eq!(describe_batches(&[3]), "batch 3");
        assert_eq!(describe_batches(&[4, 5, 6]), "batches 4-6");
        assert_eq!(describe_batches(&[6, 5]), "batches 5-6");
    }
}
