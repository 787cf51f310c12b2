//! Configuration validation.

use crate::dialect::Dialect;
use crate::error::{DbError, Result};

use super::SourceConfig;

/// Validate an endpoint descriptor.
pub fn validate(config: &SourceConfig) -> Result<()> {
    let dialect = config.dialect()?;

    if config.database.is_empty() {
        return Err(DbError::Config("database is required".into()));
    }

    // SQLite is file-backed; every other dialect needs a server address.
    if dialect != Dialect::Sqlite && config.host.is_empty() {
        return Err(DbError::Config("host is required".into()));
    }

    Ok(())
}
