//! Insert and upsert statement construction (Strategy pattern).
//!
//! A row write is one parameterized statement. The strategy decides what
//! happens on a primary-key conflict: the default insert lets the database
//! raise a constraint violation, while the PostgreSQL and MySQL strategies
//! rewrite the conflict into an update of the supplied non-key columns. A
//! caller-supplied builder always overrides dialect-based selection.

use std::fmt;
use std::sync::Arc;

use crate::core::schema::TableSchema;
use crate::core::value::{DbValue, Row};
use crate::dialect::Dialect;

/// A fully built, parameterized statement: SQL text plus bind values in
/// placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub sql: String,
    pub params: Vec<DbValue>,
}

/// A caller-supplied statement builder, overriding dialect-based selection.
pub type InsertBuilder = Arc<dyn Fn(&TableSchema, &Row) -> InsertStatement + Send + Sync>;

/// Row-insertion strategy.
#[derive(Clone)]
pub enum InsertStrategy {
    /// Plain INSERT; conflicting keys fail at execution time.
    Insert,
    /// INSERT ... ON CONFLICT (pk) DO UPDATE SET col = EXCLUDED.col.
    PostgresUpsert,
    /// INSERT ... ON DUPLICATE KEY UPDATE col = VALUES(col).
    MysqlUpsert,
    /// Caller-supplied builder.
    Custom(InsertBuilder),
}

impl fmt::Debug for InsertStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertStrategy::Insert => f.write_str("Insert"),
            InsertStrategy::PostgresUpsert => f.write_str("PostgresUpsert"),
            InsertStrategy::MysqlUpsert => f.write_str("MysqlUpsert"),
            InsertStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl InsertStrategy {
    /// Default strategy for a dialect: conflict-aware upsert where the
    /// dialect has one, plain insert otherwise.
    #[must_use]
    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Postgres => InsertStrategy::PostgresUpsert,
            Dialect::Mysql => InsertStrategy::MysqlUpsert,
            Dialect::Sqlite => InsertStrategy::Insert,
        }
    }

    /// Build the statement for one row.
    ///
    /// The row's own key order drives the column list, and columns unknown to
    /// the schema are passed through unchanged so the database reports the
    /// unknown-column error itself. Upserts against a keyless schema degrade
    /// to a plain insert.
    #[must_use]
    pub fn build(&self, dialect: Dialect, schema: &TableSchema, row: &Row) -> InsertStatement {
        match self {
            InsertStrategy::Custom(builder) => builder(schema, row),
            InsertStrategy::Insert => build_insert(dialect, &schema.name, row),
            InsertStrategy::PostgresUpsert => build_upsert_postgres(schema, row),
            InsertStrategy::MysqlUpsert => build_upsert_mysql(schema, row),
        }
    }
}

/// Plain INSERT ... VALUES statement.
fn build_insert(dialect: Dialect, table: &str, row: &Row) -> InsertStatement {
    let columns = row
        .columns()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let placeholders = (1..=row.len())
        .map(|i| dialect.param_placeholder(i))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.quote_ident(table),
        columns,
        placeholders
    );

    InsertStatement {
        sql,
        params: row.iter().map(|(_, value)| value.clone()).collect(),
    }
}

/// PostgreSQL INSERT ... ON CONFLICT upsert.
fn build_upsert_postgres(schema: &TableSchema, row: &Row) -> InsertStatement {
    let dialect = Dialect::Postgres;
    if !schema.has_pk() {
        return build_insert(dialect, &schema.name, row);
    }

    let mut stmt = build_insert(dialect, &schema.name, row);

    let conflict_cols = schema
        .primary_key
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let non_key_cols: Vec<&str> = row
        .columns()
        .map(|c| c.as_str())
        .filter(|c| !schema.is_key_column(c))
        .collect();

    stmt.sql.push_str(&format!(" ON CONFLICT ({}) DO", conflict_cols));

    if non_key_cols.is_empty() {
        // Only key columns supplied - nothing to overwrite.
        stmt.sql.push_str(" NOTHING");
    } else {
        let update_set = non_key_cols
            .iter()
            .map(|c| {
                format!(
                    "{} = EXCLUDED.{}",
                    dialect.quote_ident(c),
                    dialect.quote_ident(c)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        stmt.sql.push_str(&format!(" UPDATE SET {}", update_set));
    }

    stmt
}

/// MySQL INSERT ... ON DUPLICATE KEY UPDATE upsert.
fn build_upsert_mysql(schema: &TableSchema, row: &Row) -> InsertStatement {
    let dialect = Dialect::Mysql;
    if !schema.has_pk() {
        return build_insert(dialect, &schema.name, row);
    }

    let mut stmt = build_insert(dialect, &schema.name, row);

    let non_key_cols: Vec<&str> = row
        .columns()
        .map(|c| c.as_str())
        .filter(|c| !schema.is_key_column(c))
        .collect();

    if non_key_cols.is_empty() {
        // Only key columns supplied - skip duplicates instead of updating.
        stmt.sql = stmt.sql.replacen("INSERT INTO", "INSERT IGNORE INTO", 1);
    } else {
        let update_set = non_key_cols
            .iter()
            .map(|c| {
                format!(
                    "{} = VALUES({})",
                    dialect.quote_ident(c),
                    dialect.quote_ident(c)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        stmt.sql
            .push_str(&format!(" ON DUPLICATE KEY UPDATE {}", update_set));
    }

    stmt
}
