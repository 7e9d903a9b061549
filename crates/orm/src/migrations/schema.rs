//! Schema facade
//!
//! Applies blueprints through a storage gateway and answers existence probes
//! against the engine's system catalog.

use super::schema_builder::{Blueprint, TableBlueprint};
use crate::backends::{DatabaseValue, SqlDialect, StorageGateway};
use crate::error::OrmResult;

/// Schema operations bound to one gateway
pub struct Schema<'a> {
    db: &'a mut dyn StorageGateway,
}

impl<'a> Schema<'a> {
    pub fn new(db: &'a mut dyn StorageGateway) -> Self {
        Self { db }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.db.dialect()
    }

    /// Create a table from a blueprint configuration closure
    pub async fn create<F>(&mut self, table: &str, define: F) -> OrmResult<()>
    where
        F: FnOnce(&mut Blueprint) + Send,
    {
        let blueprint = TableBlueprint::create(table, define)?;
        self.apply(&blueprint).await
    }

    /// Alter an existing table from a blueprint configuration closure
    pub async fn table<F>(&mut self, table: &str, define: F) -> OrmResult<()>
    where
        F: FnOnce(&mut Blueprint) + Send,
    {
        let blueprint = TableBlueprint::alter(table, define)?;
        self.apply(&blueprint).await
    }

    /// Execute the statements a blueprint compiles to, in order
    pub async fn apply(&mut self, blueprint: &TableBlueprint) -> OrmResult<()> {
        for statement in blueprint.to_sql(self.dialect())? {
            self.db.execute(&statement, &[]).await?;
        }
        Ok(())
    }

    pub async fn drop(&mut self, table: &str) -> OrmResult<()> {
        let sql = format!("DROP TABLE {}", self.dialect().quote(table));
        self.db.execute(&sql, &[]).await.map(|_| ())
    }

    pub async fn drop_if_exists(&mut self, table: &str) -> OrmResult<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.dialect().quote(table));
        self.db.execute(&sql, &[]).await.map(|_| ())
    }

    pub async fn has_table(&mut self, table: &str) -> OrmResult<bool> {
        let sql = self.dialect().has_table_sql();
        let rows = self.db.query(&sql, &[DatabaseValue::from(table)]).await?;
        Ok(!rows.is_empty())
    }

    pub async fn has_column(&mut self, table: &str, column: &str) -> OrmResult<bool> {
        let sql = self.dialect().has_column_sql();
        let rows = self
            .db
            .query(&sql, &[DatabaseValue::from(table), DatabaseValue::from(column)])
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn has_index(&mut self, table: &str, index: &str) -> OrmResult<bool> {
        let sql = self.dialect().has_index_sql();
        let rows = self
            .db
            .query(&sql, &[DatabaseValue::from(table), DatabaseValue::from(index)])
            .await?;
        Ok(!rows.is_empty())
    }

    /// Names of every user table, sorted
    pub async fn table_names(&mut self) -> OrmResult<Vec<String>> {
        let sql = self.dialect().list_tables_sql();
        let rows = self.db.query(sql, &[]).await?;
        let mut names = rows
            .iter()
            .map(|row| row.get::<String>("name"))
            .collect::<OrmResult<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    /// Drop every table, ignoring foreign keys between them. Returns the
    /// dropped table names.
    pub async fn drop_all_tables(&mut self) -> OrmResult<Vec<String>> {
        let tables = self.table_names().await?;
        for statement in self.dialect().drop_all_tables_sql(&tables) {
            self.db.execute(&statement, &[]).await?;
        }
        tracing::info!(count = tables.len(), "dropped all tables");
        Ok(tables)
    }
}
