//! Schema Builder - DSL for creating database schema changes
//!
//! A [`Blueprint`] is handed by reference to a configuration closure which
//! declares columns, indexes and foreign keys. The result is validated into an
//! immutable [`TableBlueprint`] that compiles to DDL for a given
//! [`SqlDialect`]. Nothing here touches a database.

use crate::backends::SqlDialect;
use crate::error::{OrmError, OrmResult};

/// Logical column types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    BigInteger,
    Integer,
    String(u32),
    Text,
    Decimal { precision: u8, scale: u8 },
    Boolean,
    Date,
    DateTime,
    Timestamp,
    Enum(Vec<String>),
}

/// Column default values
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    CurrentTimestamp,
}

impl DefaultValue {
    fn to_sql(&self, dialect: SqlDialect) -> String {
        match self {
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::Bool(b) => dialect.boolean_literal(*b).to_string(),
            DefaultValue::Integer(i) => i.to_string(),
            DefaultValue::Float(f) => f.to_string(),
            DefaultValue::String(s) => quote_literal(s),
            DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        }
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        DefaultValue::Bool(value)
    }
}

impl From<i32> for DefaultValue {
    fn from(value: i32) -> Self {
        DefaultValue::Integer(value as i64)
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        DefaultValue::Integer(value)
    }
}

impl From<f64> for DefaultValue {
    fn from(value: f64) -> Self {
        DefaultValue::Float(value)
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        DefaultValue::String(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        DefaultValue::String(value)
    }
}

/// One column of a blueprint
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub auto_increment: bool,
    pub unsigned: bool,
}

impl ColumnDefinition {
    fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable: false,
            default: None,
            auto_increment: false,
            unsigned: false,
        }
    }
}

/// Index kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Index,
    Unique,
    Primary,
    Foreign,
}

impl IndexKind {
    fn suffix(&self) -> &'static str {
        match self {
            IndexKind::Index => "index",
            IndexKind::Unique => "unique",
            IndexKind::Primary => "primary",
            IndexKind::Foreign => "foreign",
        }
    }
}

/// Referential action applied when the referenced row is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeyAction {
    Cascade,
    SetNull,
    Restrict,
}

impl ForeignKeyAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::Restrict => "RESTRICT",
        }
    }
}

/// Target of a foreign key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyTarget {
    pub table: String,
    pub column: String,
    pub on_delete: ForeignKeyAction,
}

/// One index, primary key or foreign key of a blueprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub kind: IndexKind,
    pub columns: Vec<String>,
    pub references: Option<ForeignKeyTarget>,
}

/// Structural removals carried by an alter blueprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropCommand {
    Column(String),
    Index(String),
    Foreign(String),
}

/// Whether a blueprint describes a new table or changes to an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlueprintMode {
    Create,
    Alter,
}

/// Mutable builder handed to blueprint configuration closures
#[derive(Debug)]
pub struct Blueprint {
    table: String,
    mode: BlueprintMode,
    columns: Vec<ColumnDefinition>,
    indexes: Vec<IndexDefinition>,
    drops: Vec<DropCommand>,
}

/// Chainable handle to the column just declared
pub struct ColumnBuilder<'a> {
    column: &'a mut ColumnDefinition,
}

impl<'a> ColumnBuilder<'a> {
    /// Allow NULL values
    pub fn nullable(self) -> Self {
        self.column.nullable = true;
        self
    }

    /// Set the column default
    pub fn default(self, value: impl Into<DefaultValue>) -> Self {
        self.column.default = Some(value.into());
        self
    }

    /// Default to the current timestamp
    pub fn use_current(self) -> Self {
        self.column.default = Some(DefaultValue::CurrentTimestamp);
        self
    }

    /// Mark an integer column unsigned (only MySQL renders it)
    pub fn unsigned(self) -> Self {
        self.column.unsigned = true;
        self
    }
}

impl Blueprint {
    fn new(table: &str, mode: BlueprintMode) -> Self {
        Self {
            table: table.to_string(),
            mode,
            columns: Vec::new(),
            indexes: Vec::new(),
            drops: Vec::new(),
        }
    }

    fn add_column(&mut self, name: &str, column_type: ColumnType) -> ColumnBuilder<'_> {
        self.columns.push(ColumnDefinition::new(name, column_type));
        let index = self.columns.len() - 1;
        ColumnBuilder {
            column: &mut self.columns[index],
        }
    }

    fn add_index(&mut self, kind: IndexKind, columns: &[&str], references: Option<ForeignKeyTarget>) {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let name = format!("{}_{}_{}", self.table, columns.join("_"), kind.suffix());
        self.indexes.push(IndexDefinition {
            name,
            kind,
            columns,
            references,
        });
    }

    /// Auto-incrementing big integer primary key named `id`
    pub fn id(&mut self) -> ColumnBuilder<'_> {
        self.add_index(IndexKind::Primary, &["id"], None);
        let column = self.add_column("id", ColumnType::BigInteger);
        column.column.auto_increment = true;
        column.unsigned()
    }

    /// VARCHAR column
    pub fn string(&mut self, name: &str, length: u32) -> ColumnBuilder<'_> {
        self.add_column(name, ColumnType::String(length))
    }

    /// TEXT column
    pub fn text(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.add_column(name, ColumnType::Text)
    }

    /// INTEGER column
    pub fn integer(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.add_column(name, ColumnType::Integer)
    }

    /// Unsigned INTEGER column
    pub fn unsigned_integer(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.add_column(name, ColumnType::Integer).unsigned()
    }

    /// BIGINT column
    pub fn big_integer(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.add_column(name, ColumnType::BigInteger)
    }

    /// Unsigned BIGINT column, the type of columns referencing `id()`
    pub fn foreign_id(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.add_column(name, ColumnType::BigInteger).unsigned()
    }

    /// DECIMAL(precision, scale) column
    pub fn decimal(&mut self, name: &str, precision: u8, scale: u8) -> ColumnBuilder<'_> {
        self.add_column(name, ColumnType::Decimal { precision, scale })
    }

    /// BOOLEAN column
    pub fn boolean(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.add_column(name, ColumnType::Boolean)
    }

    /// DATE column
    pub fn date(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.add_column(name, ColumnType::Date)
    }

    /// DATETIME column
    pub fn datetime(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.add_column(name, ColumnType::DateTime)
    }

    /// Point in time, stored time-zone aware where the engine distinguishes
    pub fn timestamp(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.add_column(name, ColumnType::Timestamp)
    }

    /// Column restricted to a fixed set of values
    pub fn enumeration(&mut self, name: &str, allowed: &[&str]) -> ColumnBuilder<'_> {
        let allowed = allowed.iter().map(|v| v.to_string()).collect();
        self.add_column(name, ColumnType::Enum(allowed))
    }

    /// Nullable `created_at` and `updated_at` timestamps
    pub fn timestamps(&mut self) -> &mut Self {
        self.timestamp("created_at").nullable();
        self.timestamp("updated_at").nullable();
        self
    }

    /// Primary key over one or more columns
    pub fn primary(&mut self, columns: &[&str]) -> &mut Self {
        self.add_index(IndexKind::Primary, columns, None);
        self
    }

    /// Plain index on one column
    pub fn index(&mut self, column: &str) -> &mut Self {
        self.add_index(IndexKind::Index, &[column], None);
        self
    }

    /// Unique index on one column
    pub fn unique_index(&mut self, column: &str) -> &mut Self {
        self.add_index(IndexKind::Unique, &[column], None);
        self
    }

    /// Unique index over several columns
    pub fn unique(&mut self, columns: &[&str]) -> &mut Self {
        self.add_index(IndexKind::Unique, columns, None);
        self
    }

    /// Foreign key from `column` to `target_table.target_column`
    pub fn foreign(
        &mut self,
        column: &str,
        target_table: &str,
        target_column: &str,
        on_delete: ForeignKeyAction,
    ) -> &mut Self {
        let target = ForeignKeyTarget {
            table: target_table.to_string(),
            column: target_column.to_string(),
            on_delete,
        };
        self.add_index(IndexKind::Foreign, &[column], Some(target));
        self
    }

    /// Drop a column (alter blueprints)
    pub fn drop_column(&mut self, column: &str) -> &mut Self {
        self.drops.push(DropCommand::Column(column.to_string()));
        self
    }

    /// Drop an index or unique index by name (alter blueprints)
    pub fn drop_index(&mut self, name: &str) -> &mut Self {
        self.drops.push(DropCommand::Index(name.to_string()));
        self
    }

    /// Drop a foreign key constraint by name (alter blueprints)
    pub fn drop_foreign(&mut self, name: &str) -> &mut Self {
        self.drops.push(DropCommand::Foreign(name.to_string()));
        self
    }

    /// Validate and freeze the builder
    fn build(self) -> OrmResult<TableBlueprint> {
        if self.table.trim().is_empty() {
            return Err(OrmError::Schema("table name must not be empty".to_string()));
        }

        match self.mode {
            BlueprintMode::Create if self.columns.is_empty() => {
                return Err(OrmError::Schema(format!(
                    "table '{}' must define at least one column",
                    self.table
                )));
            }
            BlueprintMode::Create if !self.drops.is_empty() => {
                return Err(OrmError::Schema(format!(
                    "drop commands are only valid when altering '{}'",
                    self.table
                )));
            }
            BlueprintMode::Alter
                if self.columns.is_empty() && self.indexes.is_empty() && self.drops.is_empty() =>
            {
                return Err(OrmError::Schema(format!(
                    "alter blueprint for '{}' declares no changes",
                    self.table
                )));
            }
            _ => {}
        }

        for (position, column) in self.columns.iter().enumerate() {
            if self.columns[..position]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&column.name))
            {
                return Err(OrmError::Schema(format!(
                    "duplicate column '{}' in table '{}'",
                    column.name, self.table
                )));
            }
            validate_column_type(&self.table, column)?;
        }

        let primary_keys = self
            .indexes
            .iter()
            .filter(|index| index.kind == IndexKind::Primary)
            .count();
        if primary_keys > 1 {
            return Err(OrmError::Schema(format!(
                "table '{}' declares more than one primary key",
                self.table
            )));
        }

        for (position, index) in self.indexes.iter().enumerate() {
            if self.indexes[..position].iter().any(|other| other.name == index.name) {
                return Err(OrmError::Schema(format!(
                    "duplicate index '{}' in table '{}'",
                    index.name, self.table
                )));
            }

            // Alter blueprints may index columns that already exist in the table
            if self.mode == BlueprintMode::Create {
                for column in &index.columns {
                    if !self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(column)) {
                        return Err(OrmError::Schema(format!(
                            "{} '{}' references undefined column '{}'",
                            index.kind.suffix(),
                            index.name,
                            column
                        )));
                    }
                }
            }
        }

        Ok(TableBlueprint {
            table: self.table,
            mode: self.mode,
            columns: self.columns,
            indexes: self.indexes,
            drops: self.drops,
        })
    }
}

fn validate_column_type(table: &str, column: &ColumnDefinition) -> OrmResult<()> {
    match &column.column_type {
        ColumnType::String(0) => Err(OrmError::Schema(format!(
            "column '{}.{}' needs a positive length",
            table, column.name
        ))),
        ColumnType::Decimal { precision, scale } if *precision == 0 || scale > precision => {
            Err(OrmError::Schema(format!(
                "column '{}.{}' has invalid precision {} and scale {}",
                table, column.name, precision, scale
            )))
        }
        ColumnType::Enum(values) if values.is_empty() => Err(OrmError::Schema(format!(
            "enum column '{}.{}' needs at least one allowed value",
            table, column.name
        ))),
        _ => Ok(()),
    }
}

/// Validated, immutable description of one table change
#[derive(Debug, Clone, PartialEq)]
pub struct TableBlueprint {
    table: String,
    mode: BlueprintMode,
    columns: Vec<ColumnDefinition>,
    indexes: Vec<IndexDefinition>,
    drops: Vec<DropCommand>,
}

impl TableBlueprint {
    /// Describe a new table
    pub fn create<F>(table: &str, define: F) -> OrmResult<Self>
    where
        F: FnOnce(&mut Blueprint),
    {
        let mut blueprint = Blueprint::new(table, BlueprintMode::Create);
        define(&mut blueprint);
        blueprint.build()
    }

    /// Describe changes to an existing table
    pub fn alter<F>(table: &str, define: F) -> OrmResult<Self>
    where
        F: FnOnce(&mut Blueprint),
    {
        let mut blueprint = Blueprint::new(table, BlueprintMode::Alter);
        define(&mut blueprint);
        blueprint.build()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn mode(&self) -> BlueprintMode {
        self.mode
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    pub fn drops(&self) -> &[DropCommand] {
        &self.drops
    }

    /// Look up a declared column
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Compile to DDL statements for the given dialect, in execution order
    pub fn to_sql(&self, dialect: SqlDialect) -> OrmResult<Vec<String>> {
        match self.mode {
            BlueprintMode::Create => self.create_sql(dialect),
            BlueprintMode::Alter => self.alter_sql(dialect),
        }
    }

    fn primary_key(&self) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|index| index.kind == IndexKind::Primary)
    }

    /// The auto-increment column whose primary key is rendered inline
    fn inline_primary(&self) -> Option<&str> {
        let primary = self.primary_key()?;
        match primary.columns.as_slice() {
            [only] => self
                .column(only)
                .filter(|column| column.auto_increment)
                .map(|column| column.name.as_str()),
            _ => None,
        }
    }

    fn create_sql(&self, dialect: SqlDialect) -> OrmResult<Vec<String>> {
        let inline_primary = self.inline_primary();
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                let inline = inline_primary == Some(column.name.as_str());
                column_sql(&self.table, column, dialect, inline)
            })
            .collect::<OrmResult<_>>()?;

        if let Some(primary) = self.primary_key() {
            if inline_primary.is_none() {
                parts.push(format!("PRIMARY KEY ({})", dialect.quote_list(&primary.columns)));
            }
        }

        for foreign in self.indexes.iter().filter(|i| i.kind == IndexKind::Foreign) {
            parts.push(foreign_constraint_sql(foreign, dialect));
        }

        let mut statements = vec![format!(
            "CREATE TABLE {} (\n    {}\n)",
            dialect.quote(&self.table),
            parts.join(",\n    ")
        )];
        statements.extend(self.secondary_index_sql(dialect));
        Ok(statements)
    }

    fn alter_sql(&self, dialect: SqlDialect) -> OrmResult<Vec<String>> {
        let table = dialect.quote(&self.table);
        let mut statements = Vec::new();

        // Removals first: a column cannot go while a constraint still uses it
        let mut ordered_drops: Vec<&DropCommand> = self.drops.iter().collect();
        ordered_drops.sort_by_key(|drop| match drop {
            DropCommand::Foreign(_) => 0,
            DropCommand::Index(_) => 1,
            DropCommand::Column(_) => 2,
        });

        for drop in ordered_drops {
            statements.push(match (drop, dialect) {
                (DropCommand::Column(column), _) => {
                    format!("ALTER TABLE {} DROP COLUMN {}", table, dialect.quote(column))
                }
                (DropCommand::Index(name), SqlDialect::MySQL) => {
                    format!("DROP INDEX {} ON {}", dialect.quote(name), table)
                }
                (DropCommand::Index(name), _) => format!("DROP INDEX {}", dialect.quote(name)),
                (DropCommand::Foreign(name), SqlDialect::PostgreSQL) => {
                    format!("ALTER TABLE {} DROP CONSTRAINT {}", table, dialect.quote(name))
                }
                (DropCommand::Foreign(name), SqlDialect::MySQL) => {
                    format!("ALTER TABLE {} DROP FOREIGN KEY {}", table, dialect.quote(name))
                }
                (DropCommand::Foreign(name), SqlDialect::SQLite) => {
                    return Err(OrmError::Schema(format!(
                        "SQLite cannot drop foreign key '{}' from existing table '{}'",
                        name, self.table
                    )));
                }
            });
        }

        for column in &self.columns {
            let inline = self.inline_primary() == Some(column.name.as_str());
            if dialect == SqlDialect::SQLite && (column.auto_increment || inline) {
                return Err(OrmError::Schema(format!(
                    "SQLite cannot add auto-increment column '{}' to existing table '{}'",
                    column.name, self.table
                )));
            }

            let mut definition = column_sql(&self.table, column, dialect, inline)?;
            if dialect == SqlDialect::SQLite {
                if let Some(foreign) = self.foreign_key_on(&column.name) {
                    definition.push(' ');
                    definition.push_str(&references_sql(foreign, dialect));
                }
            }
            statements.push(format!("ALTER TABLE {} ADD COLUMN {}", table, definition));
        }

        if let Some(primary) = self.primary_key() {
            if self.inline_primary().is_none() {
                if dialect == SqlDialect::SQLite {
                    return Err(OrmError::Schema(format!(
                        "SQLite cannot add a primary key to existing table '{}'",
                        self.table
                    )));
                }
                statements.push(format!(
                    "ALTER TABLE {} ADD PRIMARY KEY ({})",
                    table,
                    dialect.quote_list(&primary.columns)
                ));
            }
        }

        statements.extend(self.secondary_index_sql(dialect));

        for foreign in self.indexes.iter().filter(|i| i.kind == IndexKind::Foreign) {
            if dialect == SqlDialect::SQLite {
                // Rendered inline above when the column is new in this blueprint
                let column = &foreign.columns[0];
                if self.column(column).is_none() {
                    return Err(OrmError::Schema(format!(
                        "SQLite cannot add foreign key '{}' on existing column '{}'",
                        foreign.name, column
                    )));
                }
                continue;
            }
            statements.push(format!(
                "ALTER TABLE {} ADD {}",
                table,
                foreign_constraint_sql(foreign, dialect)
            ));
        }

        Ok(statements)
    }

    fn foreign_key_on(&self, column: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|index| {
            index.kind == IndexKind::Foreign
                && index.columns.len() == 1
                && index.columns[0].eq_ignore_ascii_case(column)
        })
    }

    fn secondary_index_sql(&self, dialect: SqlDialect) -> Vec<String> {
        self.indexes
            .iter()
            .filter_map(|index| {
                let unique = match index.kind {
                    IndexKind::Index => "",
                    IndexKind::Unique => "UNIQUE ",
                    _ => return None,
                };
                Some(format!(
                    "CREATE {}INDEX {} ON {} ({})",
                    unique,
                    dialect.quote(&index.name),
                    dialect.quote(&self.table),
                    dialect.quote_list(&index.columns)
                ))
            })
            .collect()
    }
}

fn column_sql(
    table: &str,
    column: &ColumnDefinition,
    dialect: SqlDialect,
    inline_primary: bool,
) -> OrmResult<String> {
    let name = dialect.quote(&column.name);

    if column.auto_increment {
        if !inline_primary {
            return Err(OrmError::Schema(format!(
                "auto-increment column '{}.{}' must be the table's single-column primary key",
                table, column.name
            )));
        }
        let big = column.column_type == ColumnType::BigInteger;
        return Ok(match dialect {
            SqlDialect::PostgreSQL => {
                format!("{} {} PRIMARY KEY", name, if big { "BIGSERIAL" } else { "SERIAL" })
            }
            SqlDialect::MySQL => format!(
                "{} {}{} NOT NULL AUTO_INCREMENT PRIMARY KEY",
                name,
                if big { "BIGINT" } else { "INT" },
                if column.unsigned { " UNSIGNED" } else { "" }
            ),
            SqlDialect::SQLite => format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", name),
        });
    }

    let mut sql = format!("{} {}", name, column_type_sql(column, dialect));
    if column.nullable {
        if dialect == SqlDialect::MySQL {
            sql.push_str(" NULL");
        }
    } else {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&default.to_sql(dialect));
    }
    Ok(sql)
}

fn column_type_sql(column: &ColumnDefinition, dialect: SqlDialect) -> String {
    let unsigned = if column.unsigned && dialect == SqlDialect::MySQL {
        " UNSIGNED"
    } else {
        ""
    };

    match (&column.column_type, dialect) {
        (ColumnType::BigInteger, SqlDialect::SQLite) => "INTEGER".to_string(),
        (ColumnType::BigInteger, _) => format!("BIGINT{}", unsigned),
        (ColumnType::Integer, SqlDialect::MySQL) => format!("INT{}", unsigned),
        (ColumnType::Integer, _) => "INTEGER".to_string(),
        (ColumnType::String(length), _) => format!("VARCHAR({})", length),
        (ColumnType::Text, _) => "TEXT".to_string(),
        (ColumnType::Decimal { precision, scale }, _) => {
            format!("DECIMAL({}, {})", precision, scale)
        }
        (ColumnType::Boolean, SqlDialect::MySQL) => "TINYINT(1)".to_string(),
        (ColumnType::Boolean, _) => "BOOLEAN".to_string(),
        (ColumnType::Date, _) => "DATE".to_string(),
        (ColumnType::DateTime, SqlDialect::PostgreSQL) => "TIMESTAMP".to_string(),
        (ColumnType::DateTime, _) => "DATETIME".to_string(),
        (ColumnType::Timestamp, SqlDialect::PostgreSQL) => "TIMESTAMPTZ".to_string(),
        (ColumnType::Timestamp, _) => "TIMESTAMP".to_string(),
        (ColumnType::Enum(values), SqlDialect::MySQL) => format!("ENUM({})", literal_list(values)),
        (ColumnType::Enum(values), _) => format!(
            "VARCHAR(255) CHECK ({} IN ({}))",
            dialect.quote(&column.name),
            literal_list(values)
        ),
    }
}

fn references_sql(foreign: &IndexDefinition, dialect: SqlDialect) -> String {
    match &foreign.references {
        Some(target) => format!(
            "REFERENCES {} ({}) ON DELETE {}",
            dialect.quote(&target.table),
            dialect.quote(&target.column),
            target.on_delete.as_sql()
        ),
        None => String::new(),
    }
}

fn foreign_constraint_sql(foreign: &IndexDefinition, dialect: SqlDialect) -> String {
    format!(
        "CONSTRAINT {} FOREIGN KEY ({}) {}",
        dialect.quote(&foreign.name),
        dialect.quote_list(&foreign.columns),
        references_sql(foreign, dialect)
    )
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn literal_list(values: &[String]) -> String {
    values
        .iter()
        .map(|value| quote_literal(value))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artes() -> TableBlueprint {
        TableBlueprint::create("artes", |t| {
            t.id();
            t.string("titulo", 255);
            t.text("descricao").nullable();
            t.decimal("preco", 10, 2).default(0);
            t.enumeration("status", &["disponivel", "vendida", "reservada"])
                .default("disponivel");
            t.boolean("destaque").default(false);
            t.timestamps();
            t.index("status");
        })
        .unwrap()
    }

    #[test]
    fn test_create_table_postgres() {
        let sql = artes().to_sql(SqlDialect::PostgreSQL).unwrap();

        assert_eq!(sql.len(), 2);
        assert!(sql[0].starts_with("CREATE TABLE \"artes\" ("));
        assert!(sql[0].contains("\"id\" BIGSERIAL PRIMARY KEY"));
        assert!(sql[0].contains("\"titulo\" VARCHAR(255) NOT NULL"));
        assert!(sql[0].contains("\"descricao\" TEXT,"));
        assert!(sql[0].contains("\"preco\" DECIMAL(10, 2) NOT NULL DEFAULT 0"));
        assert!(sql[0].contains(
            "\"status\" VARCHAR(255) CHECK (\"status\" IN ('disponivel', 'vendida', 'reservada')) NOT NULL DEFAULT 'disponivel'"
        ));
        assert!(sql[0].contains("\"destaque\" BOOLEAN NOT NULL DEFAULT FALSE"));
        assert!(sql[0].contains("\"created_at\" TIMESTAMPTZ,"));
        assert!(!sql[0].contains("PRIMARY KEY (\"id\")"));
        assert_eq!(sql[1], "CREATE INDEX \"artes_status_index\" ON \"artes\" (\"status\")");
    }

    #[test]
    fn test_create_table_mysql() {
        let sql = artes().to_sql(SqlDialect::MySQL).unwrap();

        assert!(sql[0].contains("`id` BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY"));
        assert!(sql[0].contains(
            "`status` ENUM('disponivel', 'vendida', 'reservada') NOT NULL DEFAULT 'disponivel'"
        ));
        assert!(sql[0].contains("`descricao` TEXT NULL"));
        assert!(sql[0].contains("`destaque` TINYINT(1) NOT NULL DEFAULT 0"));
    }

    #[test]
    fn test_create_table_sqlite() {
        let sql = artes().to_sql(SqlDialect::SQLite).unwrap();
        assert!(sql[0].contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql[0].contains("\"destaque\" BOOLEAN NOT NULL DEFAULT 0"));
    }

    #[test]
    fn test_foreign_keys_and_unique_indexes() {
        let vendas = TableBlueprint::create("vendas", |t| {
            t.id();
            t.foreign_id("arte_id");
            t.foreign_id("cliente_id").nullable();
            t.decimal("valor", 10, 2);
            t.datetime("vendida_em");
            t.string("nota_fiscal", 40).nullable();
            t.foreign("arte_id", "artes", "id", ForeignKeyAction::Cascade);
            t.foreign("cliente_id", "clientes", "id", ForeignKeyAction::SetNull);
            t.unique_index("nota_fiscal");
        })
        .unwrap();

        let sql = vendas.to_sql(SqlDialect::PostgreSQL).unwrap();
        assert!(sql[0].contains(
            "CONSTRAINT \"vendas_arte_id_foreign\" FOREIGN KEY (\"arte_id\") REFERENCES \"artes\" (\"id\") ON DELETE CASCADE"
        ));
        assert!(sql[0].contains("ON DELETE SET NULL"));
        assert!(sql[0].contains("\"vendida_em\" TIMESTAMP NOT NULL"));
        assert_eq!(
            sql[1],
            "CREATE UNIQUE INDEX \"vendas_nota_fiscal_unique\" ON \"vendas\" (\"nota_fiscal\")"
        );

        let mysql = vendas.to_sql(SqlDialect::MySQL).unwrap();
        assert!(mysql[0].contains("`arte_id` BIGINT UNSIGNED NOT NULL"));
        assert!(mysql[0].contains("`vendida_em` DATETIME NOT NULL"));
    }

    #[test]
    fn test_composite_primary_key() {
        let metas = TableBlueprint::create("metas", |t| {
            t.integer("ano");
            t.integer("mes");
            t.decimal("valor", 12, 2);
            t.primary(&["ano", "mes"]);
        })
        .unwrap();

        let sql = metas.to_sql(SqlDialect::SQLite).unwrap();
        assert!(sql[0].contains("PRIMARY KEY (\"ano\", \"mes\")"));
    }

    #[test]
    fn test_composite_unique_index() {
        let metas = TableBlueprint::create("metas", |t| {
            t.id();
            t.integer("ano");
            t.integer("mes");
            t.unique(&["ano", "mes"]);
        })
        .unwrap();

        let sql = metas.to_sql(SqlDialect::MySQL).unwrap();
        assert_eq!(
            sql[1],
            "CREATE UNIQUE INDEX `metas_ano_mes_unique` ON `metas` (`ano`, `mes`)"
        );
    }

    #[test]
    fn test_duplicate_column_is_schema_error() {
        let err = TableBlueprint::create("clientes", |t| {
            t.id();
            t.string("email", 255);
            t.string("EMAIL", 120);
        })
        .unwrap_err();

        assert!(matches!(err, OrmError::Schema(ref msg) if msg.contains("duplicate column")));
    }

    #[test]
    fn test_index_on_undefined_column_is_schema_error() {
        let err = TableBlueprint::create("clientes", |t| {
            t.id();
            t.unique_index("email");
        })
        .unwrap_err();
        assert!(matches!(err, OrmError::Schema(ref msg) if msg.contains("undefined column 'email'")));

        let err = TableBlueprint::create("vendas", |t| {
            t.id();
            t.foreign("arte_id", "artes", "id", ForeignKeyAction::Restrict);
        })
        .unwrap_err();
        assert!(matches!(err, OrmError::Schema(_)));
    }

    #[test]
    fn test_second_primary_key_is_schema_error() {
        let err = TableBlueprint::create("metas", |t| {
            t.id();
            t.integer("ano");
            t.primary(&["ano"]);
        })
        .unwrap_err();
        assert!(matches!(err, OrmError::Schema(ref msg) if msg.contains("more than one primary key")));
    }

    #[test]
    fn test_invalid_column_types() {
        assert!(TableBlueprint::create("t", |t| {
            t.string("nome", 0);
        })
        .is_err());
        assert!(TableBlueprint::create("t", |t| {
            t.decimal("valor", 4, 6);
        })
        .is_err());
        assert!(TableBlueprint::create("t", |t| {
            t.enumeration("status", &[]);
        })
        .is_err());
        assert!(TableBlueprint::create("t", |_| {}).is_err());
        assert!(TableBlueprint::alter("t", |_| {}).is_err());
    }

    #[test]
    fn test_alter_add_column_per_statement() {
        let blueprint = TableBlueprint::alter("artes", |t| {
            t.decimal("custo", 10, 2).nullable();
            t.integer("ano").nullable();
            t.index("ano");
        })
        .unwrap();

        let sql = blueprint.to_sql(SqlDialect::SQLite).unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"artes\" ADD COLUMN \"custo\" DECIMAL(10, 2)".to_string(),
                "ALTER TABLE \"artes\" ADD COLUMN \"ano\" INTEGER".to_string(),
                "CREATE INDEX \"artes_ano_index\" ON \"artes\" (\"ano\")".to_string(),
            ]
        );
    }

    #[test]
    fn test_alter_drops_constraints_before_columns() {
        let blueprint = TableBlueprint::alter("vendas", |t| {
            t.drop_column("cliente_id");
            t.drop_index("vendas_nota_fiscal_unique");
            t.drop_foreign("vendas_cliente_id_foreign");
        })
        .unwrap();

        let mysql = blueprint.to_sql(SqlDialect::MySQL).unwrap();
        assert_eq!(
            mysql,
            vec![
                "ALTER TABLE `vendas` DROP FOREIGN KEY `vendas_cliente_id_foreign`".to_string(),
                "DROP INDEX `vendas_nota_fiscal_unique` ON `vendas`".to_string(),
                "ALTER TABLE `vendas` DROP COLUMN `cliente_id`".to_string(),
            ]
        );

        let pg = blueprint.to_sql(SqlDialect::PostgreSQL).unwrap();
        assert_eq!(pg[0], "ALTER TABLE \"vendas\" DROP CONSTRAINT \"vendas_cliente_id_foreign\"");
        assert_eq!(pg[1], "DROP INDEX \"vendas_nota_fiscal_unique\"");

        assert!(blueprint.to_sql(SqlDialect::SQLite).is_err());
    }

    #[test]
    fn test_alter_foreign_key_on_sqlite_is_inlined() {
        let blueprint = TableBlueprint::alter("vendas", |t| {
            t.foreign_id("vendedor_id").nullable();
            t.foreign("vendedor_id", "clientes", "id", ForeignKeyAction::SetNull);
        })
        .unwrap();

        let sqlite = blueprint.to_sql(SqlDialect::SQLite).unwrap();
        assert_eq!(
            sqlite,
            vec![
                "ALTER TABLE \"vendas\" ADD COLUMN \"vendedor_id\" INTEGER REFERENCES \"clientes\" (\"id\") ON DELETE SET NULL"
                    .to_string()
            ]
        );

        let pg = blueprint.to_sql(SqlDialect::PostgreSQL).unwrap();
        assert_eq!(pg.len(), 2);
        assert!(pg[1].starts_with("ALTER TABLE \"vendas\" ADD CONSTRAINT \"vendas_vendedor_id_foreign\""));

        let existing = TableBlueprint::alter("vendas", |t| {
            t.foreign("arte_id", "artes", "id", ForeignKeyAction::Cascade);
        })
        .unwrap();
        assert!(existing.to_sql(SqlDialect::SQLite).is_err());
        assert!(existing.to_sql(SqlDialect::MySQL).is_ok());
    }

    #[test]
    fn test_string_defaults_are_escaped() {
        let blueprint = TableBlueprint::create("clientes", |t| {
            t.id();
            t.string("cidade", 80).default("Sant'Ana");
            t.timestamp("cadastrado_em").use_current();
        })
        .unwrap();

        let sql = blueprint.to_sql(SqlDialect::PostgreSQL).unwrap();
        assert!(sql[0].contains("DEFAULT 'Sant''Ana'"));
        assert!(sql[0].contains("\"cadastrado_em\" TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP"));
    }
}
