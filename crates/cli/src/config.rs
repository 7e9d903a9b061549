//! Layered configuration: built-in defaults, then `atelie.toml`, then the
//! environment, then command-line flags.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context};
use atelie_orm::MigrationConfig;
use serde::Deserialize;

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "atelie.toml";

/// Environment enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Production,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!(
                "invalid APP_ENV '{}': expected development, testing, or production",
                s
            ),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_str = match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        };
        write!(f, "{}", env_str)
    }
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    database: DatabaseSection,
    migrations: MigrationsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DatabaseSection {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MigrationsSection {
    table: Option<String>,
    directory: Option<PathBuf>,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub config_path: Option<PathBuf>,
    pub migrations_dir: Option<PathBuf>,
}

/// Effective settings for one command
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub migrations: MigrationConfig,
    pub environment: Environment,
}

impl Settings {
    /// Load settings from the process environment and the working directory
    pub fn load(overrides: &Overrides) -> anyhow::Result<Self> {
        Self::load_with(overrides, Path::new("."), |key| std::env::var(key).ok())
    }

    /// Load settings with an explicit base directory and variable lookup
    pub fn load_with<F>(overrides: &Overrides, base_dir: &Path, env: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings {
            database_url: None,
            migrations: MigrationConfig::default(),
            environment: Environment::default(),
        };

        // Config file
        let file = match &overrides.config_path {
            Some(path) => Some(read_config_file(path)?),
            None => {
                let path = base_dir.join(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Some(read_config_file(&path)?)
                } else {
                    None
                }
            }
        };
        if let Some(file) = file {
            if let Some(url) = file.database.url {
                settings.database_url = Some(url);
            }
            if let Some(table) = file.migrations.table {
                settings.migrations.migrations_table = table;
            }
            if let Some(directory) = file.migrations.directory {
                settings.migrations.migrations_dir = directory;
            }
        }

        // Environment
        let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = env("DATABASE_URL") {
            settings.database_url = Some(url);
        }
        if let Some(table) = env("MIGRATIONS_TABLE") {
            settings.migrations.migrations_table = table;
        }
        if let Some(dir) = env("MIGRATIONS_DIR") {
            settings.migrations.migrations_dir = PathBuf::from(dir);
        }
        if let Some(app_env) = env("APP_ENV") {
            settings.environment = app_env.parse()?;
        }

        // Flags
        if let Some(url) = &overrides.database_url {
            settings.database_url = Some(url.clone());
        }
        if let Some(dir) = &overrides.migrations_dir {
            settings.migrations.migrations_dir = dir.clone();
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let table = &self.migrations.migrations_table;
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            bail!(
                "invalid migrations table name '{}': use letters, digits and underscores",
                table
            );
        }
        Ok(())
    }

    /// The database URL, or a configuration error naming every way to set it
    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url.as_deref().with_context(|| {
            format!(
                "no database URL configured: pass --database-url, set DATABASE_URL, \
                 or add [database] url to {}",
                DEFAULT_CONFIG_FILE
            )
        })
    }
}

fn read_config_file(path: &Path) -> anyhow::Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}
