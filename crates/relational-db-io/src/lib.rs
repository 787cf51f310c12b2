//! # relational-db-io
//!
//! Read rows from, and insert or upsert rows into, relational database
//! tables, inferring and creating table schemas from sample data when needed.
//!
//! This crate is the table-access layer of a data pipeline: each processing
//! unit owns one [`RelationalDb`] session and issues reads and writes against
//! named tables. Supported backends are PostgreSQL, MySQL/MariaDB, and
//! SQLite, selected at runtime from the endpoint descriptor:
//!
//! - **Reads** stream every row of a table through a bounded channel.
//! - **Writes** insert one row per call inside its own transaction, creating
//!   the table first (from an explicit schema or by inference from the row)
//!   when the table descriptor allows it.
//! - **Upserts** happen automatically on PostgreSQL (`ON CONFLICT`) and MySQL
//!   (`ON DUPLICATE KEY UPDATE`); other backends use a plain insert unless
//!   the caller supplies a custom statement builder.
//!
//! ## Example
//!
//! ```rust,no_run
//! use relational_db_io::{RelationalDb, Row, SourceConfig, TableConfig};
//!
//! #[tokio::main]
//! async fn main() -> relational_db_io::Result<()> {
//!     let source = SourceConfig::new("postgresql", "pipeline")
//!         .with_host("localhost")
//!         .with_credentials("writer", "secret")
//!         .with_create_if_missing(true);
//!
//!     let mut db = RelationalDb::new(source)?;
//!     db.start().await?;
//!
//!     let table = TableConfig::new("students")
//!         .with_create_if_missing(true)
//!         .with_primary_key_columns(["id"]);
//!     let row = Row::new().with("id", 3).with("name", "Jack3").with("age", 23);
//!     db.write(&table, &row).await?;
//!
//!     let mut rows = db.read("students").await?;
//!     while let Some(row) = rows.recv().await {
//!         println!("{:?}", row?);
//!     }
//!
//!     db.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod db;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod statement;

// Re-exports for convenient access
pub use config::{SchemaFn, SourceConfig, TableConfig};
pub use crate::core::{
    infer_column_type, schema_from_sample, ColumnDef, ColumnType, DbDriver, DbValue, NullType,
    Row, TableSchema,
};
pub use db::{RelationalDb, TableHandle};
pub use dialect::Dialect;
pub use error::{DbError, Result};
pub use statement::{InsertBuilder, InsertStatement, InsertStrategy};
