//! Database driver implementations.
//!
//! One module per backend, each implementing [`DbDriver`] on top of its sqlx
//! pool:
//!
//! - [`postgres`]: PostgreSQL driver
//! - [`mysql`]: MySQL/MariaDB driver
//! - [`sqlite`]: SQLite driver
//!
//! Drivers are selected at runtime from the descriptor's driver identifier
//! and returned as trait objects; everything above them is backend-agnostic.

pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::MysqlDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

use std::time::Duration;

use sqlx::migrate::MigrateDatabase;
use tracing::info;

use crate::config::SourceConfig;
use crate::core::schema::ColumnType;
use crate::core::traits::DbDriver;
use crate::core::value::NullType;
use crate::dialect::Dialect;
use crate::error::{DbError, Result};

/// Connection pool acquire timeout.
pub(crate) const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Pool size. A streaming read holds a connection until the stream is
/// drained, and the caller may keep writing in the meantime.
pub(crate) const MAX_POOL_CONNECTIONS: u32 = 4;

/// Buffered rows per in-flight read stream.
pub(crate) const ROW_STREAM_BUFFER: usize = 256;

/// Open a session for the configured backend.
pub async fn connect(config: &SourceConfig) -> Result<Box<dyn DbDriver>> {
    match config.dialect()? {
        Dialect::Postgres => Ok(Box::new(PostgresDriver::connect(config).await?)),
        Dialect::Mysql => Ok(Box::new(MysqlDriver::connect(config).await?)),
        Dialect::Sqlite => Ok(Box::new(SqliteDriver::connect(config).await?)),
    }
}

/// Create the target database if the descriptor asks for it and it is absent.
pub async fn ensure_database(config: &SourceConfig) -> Result<()> {
    if !config.create_if_missing {
        return Ok(());
    }

    let url = config.url()?;
    let dialect = config.dialect()?;

    let exists = match dialect {
        Dialect::Postgres => sqlx::Postgres::database_exists(&url).await,
        Dialect::Mysql => sqlx::MySql::database_exists(&url).await,
        Dialect::Sqlite => sqlx::Sqlite::database_exists(&url).await,
    }
    .map_err(|e| DbError::database_creation(config.database.clone(), e))?;

    if exists {
        return Ok(());
    }

    info!(database = %config.database, "creating missing database");
    match dialect {
        Dialect::Postgres => sqlx::Postgres::create_database(&url).await,
        Dialect::Mysql => sqlx::MySql::create_database(&url).await,
        Dialect::Sqlite => sqlx::Sqlite::create_database(&url).await,
    }
    .map_err(|e| DbError::database_creation(config.database.clone(), e))
}

/// NULL type hint matching a column type, for decoding NULL result cells.
pub(crate) fn null_type_for(column_type: ColumnType) -> NullType {
    match column_type {
        ColumnType::Boolean => NullType::Bool,
        ColumnType::Integer => NullType::Integer,
        ColumnType::Double => NullType::Double,
        ColumnType::Timestamp => NullType::DateTime,
        ColumnType::Date => NullType::Date,
        ColumnType::Text => NullType::Text,
    }
}
