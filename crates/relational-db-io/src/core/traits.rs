//! The driver trait implemented once per database backend.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::statement::InsertStatement;

use super::schema::TableSchema;
use super::value::Row;

/// One live database session.
///
/// Implementations own a connection pool for a single backend and expose the
/// handful of operations the connection manager needs: catalog lookup, table
/// creation, row streaming, and transactional single-row writes. All SQL
/// generation happens above this trait; drivers only bind and execute.
#[async_trait]
pub trait DbDriver: Send + Sync {
    /// The SQL dialect this session speaks.
    fn dialect(&self) -> Dialect;

    /// Load the schema of an existing table from the database catalog.
    ///
    /// Returns `Ok(None)` if the table does not exist.
    async fn load_schema(&self, table: &str) -> Result<Option<TableSchema>>;

    /// Execute a CREATE TABLE statement for the schema.
    async fn create_table(&self, schema: &TableSchema) -> Result<()>;

    /// Start streaming all rows of a table.
    ///
    /// Returns a channel receiver fed by a background task, so the caller can
    /// consume rows lazily with backpressure. Each call runs a fresh query.
    fn stream_rows(&self, schema: &TableSchema) -> mpsc::Receiver<Result<Row>>;

    /// Execute one insert/upsert statement in its own transaction.
    ///
    /// The transaction is rolled back before the error is returned; deciding
    /// whether to also close the session is the caller's business.
    async fn execute_insert(&self, table: &str, statement: InsertStatement) -> Result<u64>;

    /// Close the underlying connection pool.
    async fn close(&self);
}
