//! MySQL/MariaDB driver.
//!
//! Catalog queries CAST the `information_schema` string columns to CHAR to
//! sidestep collation differences across server versions. `BOOLEAN` columns
//! surface as `tinyint(1)`, so the full column type string is consulted when
//! classifying integers.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::TryStreamExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{MySql, Row as _, ValueRef as _};
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

/// MySQL/MariaDB session backed by an sqlx pool.
pub struct MysqlDriver {
    pool: MySqlPool,
}

impl MysqlDriver {
    /// Open a pool against the configured endpoint.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .database(&config.database);

        if let Some(port) = config.effective_port()? {
            options = options.port(port);
        }
        if !config.username.is_empty() {
            options = options.username(&config.username);
        }
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await?;

        // Test connection
        sqlx::query("SELECT 1").fetch_one(&pool).await?;

        info!("Connected to MySQL: {}/{}", config.host, config.database);

        Ok(Self { pool })
    }
}

#[async_trait]
impl DbDriver for MysqlDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    async fn load_schema(&self, table: &str) -> Result<Option<TableSchema>> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
                CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
                IF(EXTRA LIKE '%auto_increment%', 1, 0) AS is_identity
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let data_type: String = row.try_get("DATA_TYPE")?;
            let column_type: String = row.try_get("COLUMN_TYPE")?;
            columns.push(ColumnDef {
                name: row.try_get("COLUMN_NAME")?,
                column_type: map_mysql_type(&data_type, &column_type),
                is_nullable: row.try_get::<i32, _>("is_nullable")? == 1,
                is_identity: row.try_get::<i32, _>("is_identity")? == 1,
            });
        }

        let pk_query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;

        let pk_rows: Vec<MySqlRow> = sqlx::query(pk_query)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let mut primary_key = Vec::with_capacity(pk_rows.len());
        for row in pk_rows {
            primary_key.push(row.try_get::<String, _>("COLUMN_NAME")?);
        }

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
            let dialect = Dialect::Mysql;
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

/// Map catalog type strings to a column type tag.
///
/// `column_type` carries the display width: `tinyint(1)` is how the server
/// spells BOOLEAN, every other tinyint is an ordinary integer.
fn map_mysql_type(data_type: &str, column_type: &str) -> ColumnType {
    match data_type.to_lowercase().as_str() {
        "tinyint" => {
            if column_type.eq_ignore_ascii_case("tinyint(1)") {
                ColumnType::Boolean
            } else {
                ColumnType::Integer
            }
        }
        "bit" | "bool" | "boolean" => ColumnType::Boolean,
        "smallint" | "mediumint" | "int" | "integer" | "bigint" => ColumnType::Integer,
        "float" | "double" | "real" | "decimal" | "numeric" => ColumnType::Double,
        "datetime" | "timestamp" => ColumnType::Timestamp,
        "date" => ColumnType::Date,
        _ => ColumnType::Text,
    }
}

/// Project one result row into a record using the resolved schema.
fn decode_row(row: &MySqlRow, schema: &TableSchema) -> Result<Row> {
    let mut record = Row::new();
    for (idx, col) in schema.columns.iter().enumerate() {
        record.insert(col.name.clone(), decode_value(row, idx, col)?);
    }
    Ok(record)
}

fn decode_value(row: &MySqlRow, idx: usize, col: &ColumnDef) -> Result<DbValue> {
    let is_null = row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true);
    if is_null {
        return Ok(DbValue::Null(null_type_for(col.column_type)));
    }

    let value = match col.column_type {
        ColumnType::Boolean => row
            .try_get::<bool, _>(idx)
            .map(DbValue::Bool)
            .or_else(|_| row.try_get::<i8, _>(idx).map(|v| DbValue::Bool(v != 0)))?,
        ColumnType::Integer => row
            .try_get::<i64, _>(idx)
            .map(DbValue::Integer)
            .or_else(|_| row.try_get::<i32, _>(idx).map(|v| DbValue::Integer(v.into())))
            .or_else(|_| row.try_get::<i16, _>(idx).map(|v| DbValue::Integer(v.into())))
            .or_else(|_| row.try_get::<i8, _>(idx).map(|v| DbValue::Integer(v.into())))?,
        ColumnType::Double => row
            .try_get::<f64, _>(idx)
            .map(DbValue::Double)
            .or_else(|_| row.try_get::<f32, _>(idx).map(|v| DbValue::Double(v.into())))
            .or_else(|_| row.try_get::<Decimal, _>(idx).map(decimal_to_double))?,
        ColumnType::Timestamp => row
            .try_get::<NaiveDateTime, _>(idx)
            .map(DbValue::DateTime)
            .or_else(|_| {
                row.try_get::<DateTime<Utc>, _>(idx)
                    .map(|v| DbValue::DateTime(v.naive_utc()))
            })?,
        ColumnType::Date => DbValue::Date(row.try_get::<NaiveDate, _>(idx)?),
        ColumnType::Text => DbValue::Text(row.try_get::<String, _>(idx)?),
    };

    Ok(value)
}

fn decimal_to_double(value: Decimal) -> DbValue {
    value
        .to_f64()
        .map(DbValue::Double)
        .unwrap_or(DbValue::Null(NullType::Double))
}

/// Bind one value onto a query, using the NULL type hint for typed NULLs.
fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &DbValue,
) -> Query<'q, MySql, MySqlArguments> {
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
    fn test_map_mysql_type() {
        assert_eq!(map_mysql_type("tinyint", "tinyint(1)"), ColumnType::Boolean);
        assert_eq!(map_mysql_type("tinyint", "tinyint(4)"), ColumnType::Integer);
        assert_eq!(map_mysql_type("bigint", "bigint"), ColumnType::Integer);
        assert_eq!(map_mysql_type("double", "double"), ColumnType::Double);
        assert_eq!(map_mysql_type("decimal", "decimal(10,2)"), ColumnType::Double);
        assert_eq!(map_mysql_type("datetime", "datetime"), ColumnType::Timestamp);
        assert_eq!(map_mysql_type("date", "date"), ColumnType::Date);
        assert_eq!(map_mysql_type("varchar", "varchar(100)"), ColumnType::Text);
        assert_eq!(map_mysql_type("json", "json"), ColumnType::Text);
    }
}
