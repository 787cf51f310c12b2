//! SQLite driver.
//!
//! SQLite keeps declared column types as free text, so classification works
//! on substrings of the uppercased declaration the way the engine's own type
//! affinity rules do.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use futures::TryStreamExt;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row as _, Sqlite, ValueRef as _};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::core::schema::{ColumnDef, ColumnType, TableSchema};
use crate::core::traits::DbDriver;
use crate::core::value::{DbValue, NullType, Row};
use crate::dialect::Dialect;
use crate::error::{DbError, Result};
use crate::statement::InsertStatement;

use super::{null_type_for, MAX_POOL_CONNECTIONS, POOL_CONNECTION_TIMEOUT, ROW_STREAM_BUFFER};

/// SQLite session backed by an sqlx pool.
pub struct SqliteDriver {
    pool: SqlitePool,
}

impl SqliteDriver {
    /// Open a pool against the configured database file.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(&config.database);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await?;

        sqlx::query("SELECT 1").fetch_one(&pool).await?;

        info!("Connected to SQLite: {}", config.database);

        Ok(Self { pool })
    }
}

#[async_trait]
impl DbDriver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn load_schema(&self, table: &str) -> Result<Option<TableSchema>> {
        let query = r#"
            SELECT "name", "type", "notnull", "pk"
            FROM pragma_table_info(?)
            ORDER BY "cid"
        "#;

        let rows: Vec<SqliteRow> = sqlx::query(query)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut columns = Vec::with_capacity(rows.len());
        let mut key_columns: Vec<(i64, String)> = Vec::new();
        for row in rows {
            let name: String = row.try_get("name")?;
            let declared: String = row.try_get("type")?;
            let notnull: i64 = row.try_get("notnull")?;
            let pk: i64 = row.try_get("pk")?;

            if pk > 0 {
                key_columns.push((pk, name.clone()));
            }
            columns.push(ColumnDef {
                name,
                column_type: map_sqlite_type(&declared),
                is_nullable: notnull == 0 && pk == 0,
                is_identity: false,
            });
        }

        key_columns.sort_by_key(|(ordinal, _)| *ordinal);
        let primary_key = key_columns.into_iter().map(|(_, name)| name).collect();

        Ok(Some(TableSchema {
            name: table.to_string(),
            columns,
            primary_key,
        }))
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let ddl = self.dialect().build_create_table(schema);
        debug!(table = %schema.name, %ddl, "creating table");
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::table_creation(schema.name.clone(), e))?;
        info!(table = %schema.name, "created table");
        Ok(())
    }

    fn stream_rows(&self, schema: &TableSchema) -> mpsc::Receiver<Result<Row>> {
        let (tx, rx) = mpsc::channel(ROW_STREAM_BUFFER);
        let pool = self.pool.clone();
        let schema = schema.clone();

        tokio::spawn(async move {
            let dialect = Dialect::Sqlite;
            let columns = schema
                .columns
                .iter()
                .map(|c| dialect.quote_ident(&c.name))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT {} FROM {}",
                columns,
                dialect.quote_ident(&schema.name)
            );
            debug!(table = %schema.name, "streaming rows");

            let mut rows = sqlx::query(&sql).fetch(&pool);
            loop {
                match rows.try_next().await {
                    Ok(Some(row)) => {
                        let record = decode_row(&row, &schema);
                        let failed = record.is_err();
                        if tx.send(record).await.is_err() || failed {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        let _ = tx.send(Err(err.into())).await;
                        break;
                    }
                }
            }
        });

        rx
    }

    async fn execute_insert(&self, table: &str, statement: InsertStatement) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let mut query = sqlx::query(&statement.sql);
        for value in &statement.params {
            query = bind_value(query, value);
        }

        match query.execute(&mut *tx).await {
            Ok(result) => {
                tx.commit().await.map_err(|e| DbError::write(table, e))?;
                Ok(result.rows_affected())
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(table, error = %rollback_err, "rollback failed");
                }
                Err(DbError::write(table, err))
            }
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Classify a declared column type.
///
/// DATETIME/TIMESTAMP must be checked before DATE since DATE is a substring
/// of DATETIME.
fn map_sqlite_type(declared: &str) -> ColumnType {
    let declared = declared.to_uppercase();
    if declared.contains("BOOL") {
        ColumnType::Boolean
    } else if declared.contains("INT") {
        ColumnType::Integer
    } else if declared.contains("DOUBLE")
        || declared.contains("REAL")
        || declared.contains("FLOA")
        || declared.contains("NUMERIC")
        || declared.contains("DECIMAL")
    {
        ColumnType::Double
    } else if declared.contains("DATETIME") || declared.contains("TIMESTAMP") {
        ColumnType::Timestamp
    } else if declared.contains("DATE") {
        ColumnType::Date
    } else {
        ColumnType::Text
    }
}

/// Project one result row into a record using the resolved schema.
fn decode_row(row: &SqliteRow, schema: &TableSchema) -> Result<Row> {
    let mut record = Row::new();
    for (idx, col) in schema.columns.iter().enumerate() {
        record.insert(col.name.clone(), decode_value(row, idx, col)?);
    }
    Ok(record)
}

fn decode_value(row: &SqliteRow, idx: usize, col: &ColumnDef) -> Result<DbValue> {
    let is_null = row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true);
    if is_null {
        return Ok(DbValue::Null(null_type_for(col.column_type)));
    }

    let value = match col.column_type {
        ColumnType::Boolean => DbValue::Bool(row.try_get::<bool, _>(idx)?),
        ColumnType::Integer => DbValue::Integer(row.try_get::<i64, _>(idx)?),
        ColumnType::Double => row
            .try_get::<f64, _>(idx)
            .map(DbValue::Double)
            .or_else(|_| row.try_get::<i64, _>(idx).map(|v| DbValue::Double(v as f64)))?,
        ColumnType::Timestamp => DbValue::DateTime(row.try_get::<NaiveDateTime, _>(idx)?),
        ColumnType::Date => DbValue::Date(row.try_get::<NaiveDate, _>(idx)?),
        ColumnType::Text => DbValue::Text(row.try_get::<String, _>(idx)?),
    };

    Ok(value)
}

/// Bind one value onto a query, using the NULL type hint for typed NULLs.
fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DbValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        DbValue::Null(kind) => match kind {
            NullType::Bool => query.bind(Option::<bool>::None),
            NullType::Integer => query.bind(Option::<i64>::None),
            NullType::Double => query.bind(Option::<f64>::None),
            NullType::Text => query.bind(Option::<String>::None),
            NullType::Date => query.bind(Option::<NaiveDate>::None),
            NullType::DateTime => query.bind(Option::<NaiveDateTime>::None),
        },
        DbValue::Bool(v) => query.bind(*v),
        DbValue::Integer(v) => query.bind(*v),
        DbValue::Double(v) => query.bind(*v),
        DbValue::Text(v) => query.bind(v.clone()),
        DbValue::Date(v) => query.bind(*v),
        DbValue::DateTime(v) => query.bind(*v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_sqlite_type() {
        assert_eq!(map_sqlite_type("BOOLEAN"), ColumnType::Boolean);
        assert_eq!(map_sqlite_type("INTEGER"), ColumnType::Integer);
        assert_eq!(map_sqlite_type("BIGINT"), ColumnType::Integer);
        assert_eq!(map_sqlite_type("DOUBLE"), ColumnType::Double);
        assert_eq!(map_sqlite_type("REAL"), ColumnType::Double);
        assert_eq!(map_sqlite_type("DATETIME"), ColumnType::Timestamp);
        assert_eq!(map_sqlite_type("TIMESTAMP"), ColumnType::Timestamp);
        assert_eq!(map_sqlite_type("DATE"), ColumnType::Date);
        assert_eq!(map_sqlite_type("TEXT"), ColumnType::Text);
        assert_eq!(map_sqlite_type("VARCHAR(100)"), ColumnType::Text);
        assert_eq!(map_sqlite_type(""), ColumnType::Text);
    }

    #[test]
    fn test_datetime_classified_before_date() {
        // "DATETIME" contains "DATE"; the longer match must win.
        assert_eq!(map_sqlite_type("datetime"), ColumnType::Timestamp);
    }
}
