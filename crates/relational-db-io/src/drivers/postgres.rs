//! PostgreSQL driver.
//!
//! Catalog metadata comes from `information_schema`; rows are decoded against
//! the resolved column types with per-width fallbacks, since existing tables
//! may use narrower integer or float columns than the connector creates.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::TryStreamExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row as _, ValueRef as _};
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

/// PostgreSQL session backed by an sqlx pool.
pub struct PostgresDriver {
    pool: PgPool,
}

impl PostgresDriver {
    /// Open a pool against the configured endpoint.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let mut options = PgConnectOptions::new()
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

        let pool = PgPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await?;

        // Test connection
        sqlx::query("SELECT 1").fetch_one(&pool).await?;

        info!(
            "Connected to PostgreSQL: {}/{}",
            config.host, config.database
        );

        Ok(Self { pool })
    }
}

#[async_trait]
impl DbDriver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn load_schema(&self, table: &str) -> Result<Option<TableSchema>> {
        let query = r#"
            SELECT column_name, data_type, is_nullable, is_identity, column_default
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ORDER BY ordinal_position
        "#;

        let rows: Vec<PgRow> = sqlx::query(query)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let data_type: String = row.try_get("data_type")?;
            let is_identity: String = row.try_get("is_identity")?;
            let column_default: Option<String> = row.try_get("column_default")?;
            // Serial columns predate identity columns and show up as a
            // nextval() default instead.
            let is_serial = column_default
                .as_deref()
                .is_some_and(|d| d.starts_with("nextval("));

            columns.push(ColumnDef {
                name: row.try_get("column_name")?,
                column_type: map_pg_type(&data_type),
                is_nullable: row.try_get::<String, _>("is_nullable")? == "YES",
                is_identity: is_identity == "YES" || is_serial,
            });
        }

        let pk_query = r#"
            SELECT kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
            WHERE tc.constraint_type = 'PRIMARY KEY'
              AND tc.table_schema = current_schema()
              AND tc.table_name = $1
            ORDER BY kcu.ordinal_position
        "#;

        let pk_rows: Vec<PgRow> = sqlx::query(pk_query)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let mut primary_key = Vec::with_capacity(pk_rows.len());
        for row in pk_rows {
            primary_key.push(row.try_get::<String, _>("column_name")?);
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
            let dialect = Dialect::Postgres;
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

/// Map an `information_schema` data type to a column type tag.
fn map_pg_type(data_type: &str) -> ColumnType {
    match data_type.to_lowercase().as_str() {
        "boolean" => ColumnType::Boolean,
        "smallint" | "integer" | "bigint" => ColumnType::Integer,
        "real" | "double precision" | "numeric" | "decimal" => ColumnType::Double,
        "timestamp without time zone" | "timestamp with time zone" => ColumnType::Timestamp,
        "date" => ColumnType::Date,
        _ => ColumnType::Text,
    }
}

/// Project one result row into a record using the resolved schema.
fn decode_row(row: &PgRow, schema: &TableSchema) -> Result<Row> {
    let mut record = Row::new();
    for (idx, col) in schema.columns.iter().enumerate() {
        record.insert(col.name.clone(), decode_value(row, idx, col)?);
    }
    Ok(record)
}

fn decode_value(row: &PgRow, idx: usize, col: &ColumnDef) -> Result<DbValue> {
    let is_null = row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true);
    if is_null {
        return Ok(DbValue::Null(null_type_for(col.column_type)));
    }

    let value = match col.column_type {
        ColumnType::Boolean => DbValue::Bool(row.try_get::<bool, _>(idx)?),
        ColumnType::Integer => row
            .try_get::<i64, _>(idx)
            .map(DbValue::Integer)
            .or_else(|_| row.try_get::<i32, _>(idx).map(|v| DbValue::Integer(v.into())))
            .or_else(|_| row.try_get::<i16, _>(idx).map(|v| DbValue::Integer(v.into())))?,
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
    query: Query<'q, Postgres, PgArguments>,
    value: &DbValue,
) -> Query<'q, Postgres, PgArguments> {
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
