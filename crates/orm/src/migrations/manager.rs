//! Migration Manager - File system operations for migrations
//!
//! Handles creating, loading, and parsing `.sql` migration files. A file holds
//! an `-- Up migration` section and an optional `-- Down migration` section.

use chrono::Utc;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use std::fs;
use std::path::{Path, PathBuf};

use super::definitions::MigrationConfig;
use super::unit::{Migration, SqlMigration};
use crate::backends::SqlDialect;
use crate::error::{OrmError, OrmResult};

/// Migration manager for creating and loading migration files
pub struct MigrationManager {
    config: MigrationConfig,
}

impl MigrationManager {
    /// Create a new migration manager with default configuration
    pub fn new() -> Self {
        Self::with_config(MigrationConfig::default())
    }

    /// Create a new migration manager with custom configuration
    pub fn with_config(config: MigrationConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Create a new timestamped migration file and return its path
    pub fn create_migration(&self, name: &str) -> OrmResult<PathBuf> {
        let slug = name.trim().replace([' ', '-'], "_").to_lowercase();
        if slug.is_empty() || !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(OrmError::Migration(format!(
                "Invalid migration name '{}': use letters, digits and underscores",
                name
            )));
        }

        fs::create_dir_all(&self.config.migrations_dir)?;

        let timestamp = Utc::now().format("%Y_%m_%d_%H%M%S").to_string();
        let migration_id = format!("{}_{}", timestamp, slug);
        let filepath = self.config.migrations_dir.join(format!("{}.sql", migration_id));
        if filepath.exists() {
            return Err(OrmError::Migration(format!(
                "Migration file already exists: {}",
                filepath.display()
            )));
        }

        fs::write(&filepath, self.create_migration_template(name, &migration_id))?;
        tracing::info!(path = %filepath.display(), "created migration file");

        Ok(filepath)
    }

    /// Load all migration files from the migrations directory, sorted by name.
    /// A missing directory holds no migrations.
    pub fn load_migrations(&self) -> OrmResult<Vec<SqlMigration>> {
        if !self.config.migrations_dir.exists() {
            return Ok(Vec::new());
        }

        let mut migrations = Vec::new();
        for entry in fs::read_dir(&self.config.migrations_dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "sql") {
                migrations.push(self.parse_migration_file(&path)?);
            }
        }

        migrations.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(migrations)
    }

    /// Parse a migration file into a SqlMigration named after its file stem
    fn parse_migration_file(&self, path: &Path) -> OrmResult<SqlMigration> {
        let content = fs::read_to_string(path)?;

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                OrmError::Migration(format!("Invalid migration filename: {}", path.display()))
            })?;

        let (up_sql, down_sql) = parse_migration_content(&content).map_err(|reason| {
            OrmError::Migration(format!("{}: {}", path.display(), reason))
        })?;

        Ok(SqlMigration::new(name, up_sql, down_sql))
    }

    /// Create migration template content
    fn create_migration_template(&self, name: &str, migration_id: &str) -> String {
        format!(
            "-- Migration: {}\n\
             -- ID: {}\n\
             -- Created: {}\n\n\
             -- Up migration\n\
             -- Add your schema changes here\n\n\n\
             -- Down migration\n\
             -- Add rollback statements here\n\n",
            name,
            migration_id,
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a migration file into its UP and DOWN SQL
fn parse_migration_content(content: &str) -> Result<(String, String), String> {
    #[derive(PartialEq)]
    enum Section {
        Preamble,
        Up,
        Down,
    }

    let mut up_sql = Vec::new();
    let mut down_sql = Vec::new();
    let mut section = Section::Preamble;
    let mut saw_up = false;

    for line in content.lines() {
        let trimmed = line.trim();

        if let Some(comment) = trimmed.strip_prefix("--") {
            let marker = comment.trim().to_lowercase();
            if marker == "up" || marker.starts_with("up migration") {
                if saw_up {
                    return Err("duplicate '-- Up migration' marker".to_string());
                }
                saw_up = true;
                section = Section::Up;
            } else if marker == "down" || marker.starts_with("down migration") {
                if section == Section::Preamble {
                    return Err("'-- Down migration' appears before '-- Up migration'".to_string());
                }
                section = Section::Down;
            }
            continue;
        }

        if trimmed.is_empty() {
            continue;
        }

        match section {
            Section::Up => up_sql.push(line),
            Section::Down => down_sql.push(line),
            Section::Preamble => {
                return Err("SQL found before the '-- Up migration' marker".to_string())
            }
        }
    }

    if !saw_up {
        return Err("missing '-- Up migration' marker".to_string());
    }

    Ok((
        up_sql.join("\n").trim().to_string(),
        down_sql.join("\n").trim().to_string(),
    ))
}

/// Split SQL text into executable statements using the dialect's parser,
/// falling back to naive semicolon splitting when the text does not parse.
pub fn split_sql_statements(sql: &str, dialect: SqlDialect) -> Vec<String> {
    let parser_dialect: Box<dyn Dialect> = match dialect {
        SqlDialect::PostgreSQL => Box::new(PostgreSqlDialect {}),
        SqlDialect::MySQL => Box::new(MySqlDialect {}),
        SqlDialect::SQLite => Box::new(SQLiteDialect {}),
    };

    match Parser::parse_sql(parser_dialect.as_ref(), sql) {
        Ok(parsed) => parsed.iter().map(|statement| statement.to_string()).collect(),
        Err(e) => {
            tracing::warn!("SQL parsing failed, using naive semicolon splitting: {}", e);
            sql.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }
    }
}
