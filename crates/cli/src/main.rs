mod commands;
mod config;
mod logging;
mod migrations;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use console::style;

use config::{Overrides, Settings};

#[derive(Parser)]
#[command(name = "atelie")]
#[command(about = "Schema migrations for the atelie business application")]
#[command(version)]
struct Cli {
    /// Database URL (postgres://, mysql:// or sqlite:)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Config file (defaults to ./atelie.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding .sql migration files
    #[arg(long, global = true)]
    migrations_dir: Option<PathBuf>,

    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database migrations
    Migrate(MigrateArgs),
}

#[derive(Args)]
struct MigrateArgs {
    /// Give every pending migration its own batch
    #[arg(long)]
    step: bool,

    #[command(subcommand)]
    command: Option<MigrateCommands>,
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Drop every table and run all migrations from scratch
    Fresh {
        /// Skip the production confirmation
        #[arg(long)]
        force: bool,
    },

    /// Rollback the last batches of migrations
    Rollback {
        /// Number of batches to rollback
        #[arg(default_value_t = 1)]
        steps: usize,

        /// Rollback exactly this batch
        #[arg(long, conflicts_with = "steps")]
        batch: Option<i64>,
    },

    /// Rollback every applied migration
    Reset {
        /// Skip the production confirmation
        #[arg(long)]
        force: bool,
    },

    /// Show migration status
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a new SQL migration file
    Make {
        /// Migration name
        name: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.verbose) {
        eprintln!("{} {:#}", style("error:").red().bold(), e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = Overrides {
        database_url: cli.database_url,
        config_path: cli.config,
        migrations_dir: cli.migrations_dir,
    };
    let settings = Settings::load(&overrides)?;
    tracing::debug!(
        environment = %settings.environment,
        table = %settings.migrations.migrations_table,
        dir = %settings.migrations.migrations_dir.display(),
        "loaded settings"
    );

    match cli.command {
        Commands::Migrate(args) => match args.command {
            None => commands::migrate::run(&settings, args.step).await,
            Some(MigrateCommands::Fresh { force }) => {
                commands::migrate::fresh(&settings, force).await
            }
            Some(MigrateCommands::Rollback { steps, batch }) => {
                commands::migrate::rollback(&settings, steps, batch).await
            }
            Some(MigrateCommands::Reset { force }) => {
                commands::migrate::reset(&settings, force).await
            }
            Some(MigrateCommands::Status { json }) => {
                commands::migrate::status(&settings, json).await
            }
            Some(MigrateCommands::Make { name }) => commands::migrate::make(&settings, &name),
        },
    }
}
