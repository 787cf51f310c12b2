//! The connection manager: session lifecycle, table resolution, and the
//! per-session table cache.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{SourceConfig, TableConfig};
use crate::core::infer::schema_from_sample;
use crate::core::schema::TableSchema;
use crate::core::traits::DbDriver;
use crate::core::value::Row;
use crate::drivers;
use crate::error::{DbError, Result};
use crate::statement::InsertStrategy;

/// A resolved table: the cached schema plus the column names used to project
/// result rows.
#[derive(Debug, Clone)]
pub struct TableHandle {
    schema: TableSchema,
    column_names: Vec<String>,
}

impl TableHandle {
    fn new(schema: TableSchema) -> Self {
        let column_names = schema.column_names();
        Self {
            schema,
            column_names,
        }
    }

    /// The resolved schema.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Column names in table order.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }
}

/// Owns one database session at a time and exposes table reads and writes
/// bound to it.
///
/// Resolved table schemas are cached by name for the lifetime of the session:
/// once a table is loaded or created, later operations on the same name reuse
/// the cached schema without re-inference or re-creation. The cache is
/// private to this instance; run one manager per processing unit rather than
/// sharing one across threads.
pub struct RelationalDb {
    source: SourceConfig,
    driver: Option<Box<dyn DbDriver>>,
    tables: HashMap<String, TableHandle>,
}

impl RelationalDb {
    /// Create a closed manager for the endpoint.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the descriptor is invalid.
    pub fn new(source: SourceConfig) -> Result<Self> {
        source.validate()?;
        Ok(Self {
            source,
            driver: None,
            tables: HashMap::new(),
        })
    }

    /// Open a session.
    ///
    /// Creates the target database first when the descriptor's
    /// create-if-missing flag is set and the database is absent. Calling
    /// `start` on an open manager replaces the session.
    pub async fn start(&mut self) -> Result<()> {
        drivers::ensure_database(&self.source).await?;
        let driver = drivers::connect(&self.source).await?;
        self.driver = Some(driver);
        Ok(())
    }

    /// Close the session and drop the table cache.
    ///
    /// Subsequent operations require a new [`start`](Self::start).
    pub async fn close(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.close().await;
        }
        self.tables.clear();
    }

    /// Check whether a session is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.driver.is_some()
    }

    /// Stream all rows of the named table.
    ///
    /// Rows arrive through a bounded channel fed by a background task; each
    /// call runs a fresh query. Fails with a resolution error if the table
    /// does not exist - the read path never creates tables.
    pub async fn read(&mut self, table_name: &str) -> Result<mpsc::Receiver<Result<Row>>> {
        let schema = self.resolve_for_read(table_name).await?;
        let driver = self.driver.as_deref().ok_or(DbError::SessionClosed)?;
        Ok(driver.stream_rows(&schema))
    }

    /// Insert or upsert one row.
    ///
    /// Resolves the table first, creating it when the descriptor allows and
    /// it is absent. The write runs in its own transaction; if it fails, the
    /// transaction is rolled back and the session closed before the error is
    /// returned, so the caller must `start()` again to continue.
    pub async fn write(&mut self, config: &TableConfig, row: &Row) -> Result<()> {
        let schema = self.resolve_for_write(config, row).await?;

        let driver = self.driver.as_deref().ok_or(DbError::SessionClosed)?;
        let dialect = driver.dialect();
        let strategy = match &config.insert_builder {
            Some(builder) => InsertStrategy::Custom(builder.clone()),
            None => InsertStrategy::for_dialect(dialect),
        };
        let statement = strategy.build(dialect, &schema, row);

        match driver.execute_insert(&schema.name, statement).await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(table = %schema.name, error = %err, "write failed, closing session");
                self.close().await;
                Err(err)
            }
        }
    }

    /// Resolve a table for reading: cache, then catalog. Never creates.
    async fn resolve_for_read(&mut self, table_name: &str) -> Result<TableSchema> {
        if let Some(handle) = self.tables.get(table_name) {
            return Ok(handle.schema().clone());
        }

        let driver = self.driver.as_deref().ok_or(DbError::SessionClosed)?;
        let schema = driver
            .load_schema(table_name)
            .await?
            .ok_or_else(|| DbError::TableResolution(table_name.to_string()))?;

        self.cache(schema.clone());
        Ok(schema)
    }

    /// Resolve a table for writing: cache, then catalog, then creation when
    /// permitted.
    async fn resolve_for_write(&mut self, config: &TableConfig, sample: &Row) -> Result<TableSchema> {
        if let Some(handle) = self.tables.get(&config.name) {
            // Cached schemas are reused as-is, without checking the new row's
            // shape; novel columns surface as database errors at write time.
            return Ok(handle.schema().clone());
        }

        let driver = self.driver.as_deref().ok_or(DbError::SessionClosed)?;
        let schema = match driver.load_schema(&config.name).await? {
            Some(schema) => schema,
            None if config.create_if_missing => {
                let schema = match &config.schema_fn {
                    Some(define) => define(),
                    None => {
                        schema_from_sample(&config.name, sample, &config.primary_key_columns)?
                    }
                };
                driver.create_table(&schema).await?;
                info!(table = %schema.name, "created missing table");
                schema
            }
            None => return Err(DbError::TableResolution(config.name.clone())),
        };

        self.cache(schema.clone());
        Ok(schema)
    }

    fn cache(&mut self, schema: TableSchema) {
        self.tables
            .insert(schema.name.clone(), TableHandle::new(schema));
    }

    #[cfg(test)]
    fn with_driver(source: SourceConfig, driver: Box<dyn DbDriver>) -> Self {
        Self {
            source,
            driver: Some(driver),
            tables: HashMap::new(),
        }
    }

    #[cfg(test)]
    fn set_driver(&mut self, driver: Box<dyn DbDriver>) {
        self.driver = Some(driver);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::core::schema::{ColumnDef, ColumnType};
    use crate::dialect::Dialect;
    use crate::statement::InsertStatement;

    use super::*;

    /// In-memory driver standing in for a live database.
    #[derive(Default)]
    struct MockDriver {
        schemas: Mutex<HashMap<String, TableSchema>>,
        loads: AtomicUsize,
        creates: AtomicUsize,
        inserts: Mutex<Vec<String>>,
        fail_inserts: bool,
    }

    impl MockDriver {
        fn with_table(self, schema: TableSchema) -> Self {
            self.schemas
                .lock()
                .unwrap()
                .insert(schema.name.clone(), schema);
            self
        }

        fn failing() -> Self {
            Self {
                fail_inserts: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl DbDriver for Arc<MockDriver> {
        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        async fn load_schema(&self, table: &str) -> Result<Option<TableSchema>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.schemas.lock().unwrap().get(table).cloned())
        }

        async fn create_table(&self, schema: &TableSchema) -> Result<()> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.schemas
                .lock()
                .unwrap()
                .insert(schema.name.clone(), schema.clone());
            Ok(())
        }

        fn stream_rows(&self, _schema: &TableSchema) -> mpsc::Receiver<Result<Row>> {
            let (_tx, rx) = mpsc::channel(1);
            rx
        }

        async fn execute_insert(&self, table: &str, statement: InsertStatement) -> Result<u64> {
            if self.fail_inserts {
                return Err(DbError::write(table, sqlx::Error::RowNotFound));
            }
            self.inserts.lock().unwrap().push(statement.sql);
            Ok(1)
        }

        async fn close(&self) {}
    }

    fn manager_with(mock: Arc<MockDriver>) -> RelationalDb {
        let source = SourceConfig::new("sqlite", "/tmp/mock.sqlite3");
        RelationalDb::with_driver(source, Box::new(mock))
    }

    fn students_schema() -> TableSchema {
        TableSchema::new(
            "students",
            vec![
                ColumnDef::key("id", ColumnType::Double),
                ColumnDef::new("name", ColumnType::Text),
            ],
        )
        .with_primary_key(["id"])
    }

    fn jack() -> Row {
        Row::new().with("id", 3).with("name", "Jack3")
    }

    #[tokio::test]
    async fn test_read_missing_table_is_a_resolution_error() {
        let mock = Arc::new(MockDriver::default());
        let mut db = manager_with(mock);
        let err = db.read("absent").await.unwrap_err();
        assert!(matches!(err, DbError::TableResolution(name) if name == "absent"));
    }

    #[tokio::test]
    async fn test_write_without_create_flag_creates_nothing() {
        let mock = Arc::new(MockDriver::default());
        let mut db = manager_with(mock.clone());

        let config = TableConfig::new("students");
        let err = db.write(&config, &jack()).await.unwrap_err();

        assert!(matches!(err, DbError::TableResolution(_)));
        assert_eq!(mock.creates.load(Ordering::SeqCst), 0);
        // Resolution failures leave the session open.
        assert!(db.is_open());
    }

    #[tokio::test]
    async fn test_write_creates_table_once_and_caches_schema() {
        let mock = Arc::new(MockDriver::default());
        let mut db = manager_with(mock.clone());

        let config = TableConfig::new("students")
            .with_create_if_missing(true)
            .with_primary_key_columns(["id"]);

        db.write(&config, &jack()).await.unwrap();
        db.write(&config, &jack().with("name", "Jill")).await.unwrap();

        assert_eq!(mock.loads.load(Ordering::SeqCst), 1);
        assert_eq!(mock.creates.load(Ordering::SeqCst), 1);
        assert_eq!(mock.inserts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_existing_table_is_not_recreated() {
        let mock = Arc::new(MockDriver::default().with_table(students_schema()));
        let mut db = manager_with(mock.clone());

        let config = TableConfig::new("students").with_create_if_missing(true);
        db.write(&config, &jack()).await.unwrap();

        assert_eq!(mock.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_read_reuses_schema_cached_by_write() {
        let mock = Arc::new(MockDriver::default());
        let mut db = manager_with(mock.clone());

        let config = TableConfig::new("students")
            .with_create_if_missing(true)
            .with_primary_key_columns(["id"]);
        db.write(&config, &jack()).await.unwrap();

        let _rows = db.read("students").await.unwrap();
        assert_eq!(mock.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_write_closes_session() {
        let mock = Arc::new(MockDriver::failing().with_table(students_schema()));
        let mut db = manager_with(mock);

        let config = TableConfig::new("students");
        let err = db.write(&config, &jack()).await.unwrap_err();
        assert!(matches!(err, DbError::Write { .. }));
        assert!(!db.is_open());

        // Every operation now needs a new start().
        let err = db.read("students").await.unwrap_err();
        assert!(matches!(err, DbError::SessionClosed));
    }

    #[tokio::test]
    async fn test_close_clears_the_table_cache() {
        let mock = Arc::new(MockDriver::default().with_table(students_schema()));
        let mut db = manager_with(mock.clone());

        db.read("students").await.unwrap();
        assert_eq!(mock.loads.load(Ordering::SeqCst), 1);

        db.close().await;
        db.set_driver(Box::new(mock.clone()));

        db.read("students").await.unwrap();
        assert_eq!(mock.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_schema_fn_overrides_inference() {
        let mock = Arc::new(MockDriver::default());
        let mut db = manager_with(mock.clone());

        let config = TableConfig::new("students")
            .with_create_if_missing(true)
            .with_schema_fn(Arc::new(|| {
                TableSchema::new(
                    "students",
                    vec![
                        ColumnDef::key("code", ColumnType::Text),
                        ColumnDef::new("name", ColumnType::Text),
                    ],
                )
                .with_primary_key(["code"])
            }));

        let row = Row::new().with("code", "s-3").with("name", "Jack3");
        db.write(&config, &row).await.unwrap();

        let created = mock
            .schemas
            .lock()
            .unwrap()
            .get("students")
            .cloned()
            .unwrap();
        assert_eq!(created.primary_key, vec!["code"]);
    }

    #[tokio::test]
    async fn test_new_validates_the_descriptor() {
        assert!(RelationalDb::new(SourceConfig::new("oracle", "db")).is_err());
    }
}
