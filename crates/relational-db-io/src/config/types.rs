//! Configuration type definitions for database endpoints and tables.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::schema::TableSchema;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::statement::InsertBuilder;

/// Database endpoint descriptor.
///
/// Identifies exactly one database and is immutable after construction. For
/// SQLite the `database` field is the file path and the server fields are
/// ignored.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Driver identifier (e.g. "postgresql", "mysql", "sqlite"). Compound
    /// identifiers like "postgresql+psycopg2" are accepted.
    pub driver: String,

    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port. Defaults to the dialect's standard port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name (file path for SQLite).
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub username: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Create the database at session start if it does not exist.
    #[serde(default)]
    pub create_if_missing: bool,
}

impl SourceConfig {
    /// Create a descriptor for the given driver and database.
    pub fn new(driver: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            host: String::new(),
            port: None,
            database: database.into(),
            username: String::new(),
            password: String::new(),
            create_if_missing: false,
        }
    }

    /// Set the host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set a non-default port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set username and password.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set whether to create the database at session start if absent.
    #[must_use]
    pub fn with_create_if_missing(mut self, create_if_missing: bool) -> Self {
        self.create_if_missing = create_if_missing;
        self
    }

    /// Resolve the SQL dialect from the driver identifier.
    pub fn dialect(&self) -> Result<Dialect> {
        Dialect::from_driver(&self.driver)
    }

    /// The effective port: explicit if set, the dialect default otherwise.
    pub fn effective_port(&self) -> Result<Option<u16>> {
        Ok(self.port.or(self.dialect()?.default_port()))
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("create_if_missing", &self.create_if_missing)
            .finish()
    }
}

/// A shared closure producing an explicit table schema, bypassing inference.
pub type SchemaFn = Arc<dyn Fn() -> TableSchema + Send + Sync>;

/// Table descriptor supplied with each write.
///
/// Carries the table name plus the knobs controlling resolution and insert
/// behavior. Cheap to clone; the closures are shared.
#[derive(Clone)]
pub struct TableConfig {
    /// Table name.
    pub name: String,

    /// Explicit schema definition, overriding sample-based inference.
    pub schema_fn: Option<SchemaFn>,

    /// Create the table on first write if it does not exist.
    pub create_if_missing: bool,

    /// Primary key column names for inferred schemas. Empty means a
    /// synthetic integer key is added.
    pub primary_key_columns: Vec<String>,

    /// Custom statement builder, overriding dialect-based upsert selection.
    pub insert_builder: Option<InsertBuilder>,
}

impl TableConfig {
    /// Create a descriptor for the named table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema_fn: None,
            create_if_missing: false,
            primary_key_columns: Vec::new(),
            insert_builder: None,
        }
    }

    /// Supply an explicit schema definition.
    #[must_use]
    pub fn with_schema_fn(mut self, schema_fn: SchemaFn) -> Self {
        self.schema_fn = Some(schema_fn);
        self
    }

    /// Set whether to create the table on first write if absent.
    #[must_use]
    pub fn with_create_if_missing(mut self, create_if_missing: bool) -> Self {
        self.create_if_missing = create_if_missing;
        self
    }

    /// Set the primary key column names used when inferring a schema.
    #[must_use]
    pub fn with_primary_key_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Supply a custom insert/upsert statement builder.
    #[must_use]
    pub fn with_insert_builder(mut self, builder: InsertBuilder) -> Self {
        self.insert_builder = Some(builder);
        self
    }
}

impl fmt::Debug for TableConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableConfig")
            .field("name", &self.name)
            .field("schema_fn", &self.schema_fn.as_ref().map(|_| "Fn(..)"))
            .field("create_if_missing", &self.create_if_missing)
            .field("primary_key_columns", &self.primary_key_columns)
            .field(
                "insert_builder",
                &self.insert_builder.as_ref().map(|_| "Fn(..)"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_config_builder() {
        let config = SourceConfig::new("postgresql", "pipeline")
            .with_host("db.example.com")
            .with_port(6432)
            .with_credentials("writer", "secret")
            .with_create_if_missing(true);

        assert_eq!(config.driver, "postgresql");
        assert_eq!(config.host, "db.example.com");
        assert_eq!(config.port, Some(6432));
        assert_eq!(config.database, "pipeline");
        assert!(config.create_if_missing);
    }

    #[test]
    fn test_effective_port_defaults_per_dialect() {
        let pg = SourceConfig::new("postgresql", "db").with_host("h");
        assert_eq!(pg.effective_port().unwrap(), Some(5432));

        let my = SourceConfig::new("mysql", "db").with_host("h");
        assert_eq!(my.effective_port().unwrap(), Some(3306));

        let lite = SourceConfig::new("sqlite", "/tmp/db.sqlite3");
        assert_eq!(lite.effective_port().unwrap(), None);

        let explicit = SourceConfig::new("postgresql", "db").with_port(6432);
        assert_eq!(explicit.effective_port().unwrap(), Some(6432));
    }

    #[test]
    fn test_source_config_from_json() {
        let config: SourceConfig = serde_json::from_str(
            r#"{"driver": "mysql", "host": "localhost", "database": "app"}"#,
        )
        .unwrap();
        assert_eq!(config.driver, "mysql");
        assert!(config.port.is_none());
        assert!(!config.create_if_missing);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = SourceConfig::new("postgresql", "db").with_credentials("u", "super_secret");
        let output = format!("{:?}", config);
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("super_secret"));
    }

    #[test]
    fn test_table_config_builder() {
        let config = TableConfig::new("students")
            .with_create_if_missing(true)
            .with_primary_key_columns(["id"]);

        assert_eq!(config.name, "students");
        assert!(config.create_if_missing);
        assert_eq!(config.primary_key_columns, vec!["id"]);
        assert!(config.schema_fn.is_none());
        assert!(config.insert_builder.is_none());
    }
}
