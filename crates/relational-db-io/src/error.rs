//! Error types for table read/write operations.

use thiserror::Error;

/// Main error type for database table operations.
#[derive(Error, Debug)]
pub enum DbError {
    /// Configuration error (unknown driver, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An operation was attempted without an open session.
    #[error("Session is not open - call start() first")]
    SessionClosed,

    /// Requested table is absent and creating it is not permitted.
    #[error("Failed to resolve table {0}: table does not exist")]
    TableResolution(String),

    /// The database rejected a CREATE TABLE statement.
    #[error("Failed to create table {table}: {source}")]
    TableCreation {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// An insert or upsert failed. The transaction has been rolled back and
    /// the session closed before this error is returned.
    #[error("Write to table {table} failed: {source}")]
    Write {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// Creating the target database itself failed at session start.
    #[error("Failed to create database {database}: {source}")]
    DatabaseCreation {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// Any other client-library failure (connectivity, catalog queries, row
    /// decoding).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl DbError {
    /// Create a TableCreation error.
    pub fn table_creation(table: impl Into<String>, source: sqlx::Error) -> Self {
        DbError::TableCreation {
            table: table.into(),
            source,
        }
    }

    /// Create a Write error.
    pub fn write(table: impl Into<String>, source: sqlx::Error) -> Self {
        DbError::Write {
            table: table.into(),
            source,
        }
    }

    /// Create a DatabaseCreation error.
    pub fn database_creation(database: impl Into<String>, source: sqlx::Error) -> Self {
        DbError::DatabaseCreation {
            database: database.into(),
            source,
        }
    }
}

/// Result type alias for table operations.
pub type Result<T> = std::result::Result<T, DbError>;
