//! SQL dialect capabilities.
//!
//! Dialect-conditional behavior is a small enumerated capability lookup keyed
//! by the driver identifier from the source descriptor: identifier quoting,
//! parameter placeholders, type rendering, and CREATE TABLE generation.

use crate::core::schema::{ColumnDef, ColumnType, TableSchema};
use crate::error::{DbError, Result};

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    Mysql,
    Sqlite,
}

impl Dialect {
    /// Resolve a dialect from a driver identifier.
    ///
    /// Compound identifiers in the `postgresql+psycopg2` style match by
    /// substring, so pipeline configurations written against other client
    /// stacks keep working unchanged.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the driver is not recognized.
    pub fn from_driver(driver: &str) -> Result<Self> {
        let normalized = driver.to_lowercase();
        if normalized.contains("postgres") || normalized == "pg" {
            Ok(Dialect::Postgres)
        } else if normalized.contains("mysql") || normalized.contains("mariadb") {
            Ok(Dialect::Mysql)
        } else if normalized.contains("sqlite") {
            Ok(Dialect::Sqlite)
        } else {
            Err(DbError::Config(format!(
                "Unknown driver: '{}'. Supported drivers: postgresql, mysql, sqlite",
                driver
            )))
        }
    }

    /// Get the dialect identifier.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Default server port, if the dialect has one.
    #[must_use]
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Dialect::Postgres => Some(5432),
            Dialect::Mysql => Some(3306),
            Dialect::Sqlite => None,
        }
    }

    /// Quote an identifier (table name, column name, etc.).
    ///
    /// - PostgreSQL/SQLite: `"identifier"`
    /// - MySQL: `` `identifier` ``
    #[must_use]
    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// Get a parameter placeholder for the given 1-based index.
    ///
    /// - PostgreSQL: `$1`, `$2`, etc.
    /// - MySQL/SQLite: `?`
    #[must_use]
    pub fn param_placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Mysql | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Whether the dialect accepts VARCHAR without a length.
    ///
    /// Text columns are rendered unbounded where this holds and as
    /// `VARCHAR(100)` otherwise.
    #[must_use]
    pub fn supports_unbounded_text(&self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite)
    }

    /// Render a column type as dialect SQL.
    #[must_use]
    pub fn sql_type(&self, column_type: ColumnType) -> &'static str {
        match (self, column_type) {
            (_, ColumnType::Boolean) => "BOOLEAN",
            (_, ColumnType::Integer) => "BIGINT",
            (Dialect::Postgres, ColumnType::Double) => "DOUBLE PRECISION",
            (_, ColumnType::Double) => "DOUBLE",
            (Dialect::Postgres, ColumnType::Timestamp) => "TIMESTAMP",
            (_, ColumnType::Timestamp) => "DATETIME",
            (_, ColumnType::Date) => "DATE",
            (_, ColumnType::Text) => {
                if self.supports_unbounded_text() {
                    "TEXT"
                } else {
                    "VARCHAR(100)"
                }
            }
        }
    }

    /// Build a CREATE TABLE statement for the schema.
    #[must_use]
    pub fn build_create_table(&self, schema: &TableSchema) -> String {
        // SQLite auto-increment only exists as an inline single-column
        // primary key, which then replaces the table-level key clause.
        let inline_sqlite_key = *self == Dialect::Sqlite
            && schema.primary_key.len() == 1
            && schema
                .find_column(&schema.primary_key[0])
                .is_some_and(|c| c.is_identity);

        let col_defs: Vec<String> = schema
            .columns
            .iter()
            .map(|c| self.column_def(c, inline_sqlite_key))
            .collect();

        let mut parts = col_defs;
        if schema.has_pk() && !inline_sqlite_key {
            let key_cols = schema
                .primary_key
                .iter()
                .map(|c| self.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("PRIMARY KEY ({})", key_cols));
        }

        let mut sql = format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.quote_ident(&schema.name),
            parts.join(",\n    ")
        );

        if *self == Dialect::Mysql {
            sql.push_str(" ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci");
        }

        sql
    }

    /// Render one column definition.
    fn column_def(&self, col: &ColumnDef, inline_sqlite_key: bool) -> String {
        let name = self.quote_ident(&col.name);

        if col.is_identity {
            return match self {
                Dialect::Postgres => format!("{} BIGSERIAL", name),
                Dialect::Mysql => format!("{} BIGINT NOT NULL AUTO_INCREMENT", name),
                Dialect::Sqlite => {
                    if inline_sqlite_key {
                        format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", name)
                    } else {
                        format!("{} INTEGER NOT NULL", name)
                    }
                }
            };
        }

        let null_clause = if col.is_nullable { "" } else { " NOT NULL" };
        format!("{} {}{}", name, self.sql_type(col.column_type), null_clause)
    }
}
