//! Migration units
//!
//! A unit is a named change with a forward `up` and a structural inverse
//! `down`. Code units implement [`Migration`] directly; raw SQL units are
//! [`SqlMigration`] values, either built in code or loaded from `.sql` files.

use async_trait::async_trait;

use super::manager::split_sql_statements;
use crate::backends::StorageGateway;
use crate::error::OrmResult;

/// A named, ordered schema change.
///
/// The runner invokes `up` at most once per name, but units may also be run
/// by hand, so optional changes should probe the catalog (see
/// [`Schema::has_column`](super::schema::Schema::has_column)) before acting.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique name, prefixed with its ordering key (`001_...`, `2024_01_15_000001_...`)
    fn name(&self) -> &str;

    /// Apply the change
    async fn up(&self, db: &mut dyn StorageGateway) -> OrmResult<()>;

    /// Revert the change
    async fn down(&self, db: &mut dyn StorageGateway) -> OrmResult<()>;
}

/// Migration made of raw SQL text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    name: String,
    up_sql: String,
    down_sql: String,
}

impl SqlMigration {
    pub fn new(
        name: impl Into<String>,
        up_sql: impl Into<String>,
        down_sql: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            up_sql: up_sql.into(),
            down_sql: down_sql.into(),
        }
    }

    pub fn up_sql(&self) -> &str {
        &self.up_sql
    }

    pub fn down_sql(&self) -> &str {
        &self.down_sql
    }

    async fn run(&self, db: &mut dyn StorageGateway, sql: &str) -> OrmResult<()> {
        let statements = split_sql_statements(sql, db.dialect());
        if statements.is_empty() {
            tracing::warn!(migration = %self.name, "migration section has no statements");
        }
        for statement in statements {
            db.execute(&statement, &[]).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        self.run(db, &self.up_sql).await
    }

    async fn down(&self, db: &mut dyn StorageGateway) -> OrmResult<()> {
        self.run(db, &self.down_sql).await
    }
}
