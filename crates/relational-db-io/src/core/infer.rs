//! Column-type inference from sample values and schema synthesis from sample
//! rows.

use crate::error::{DbError, Result};

use super::schema::{ColumnDef, ColumnType, TableSchema};
use super::value::{DbValue, Row};

/// Infer a column type from a sample value.
///
/// Rules are first-match-wins in this order: boolean, numeric, timestamp,
/// date, text fallback. The ordering is load-bearing for dynamically typed
/// sources, where booleans also behave as numbers and timestamps also behave
/// as dates; the tagged value keeps that precedence explicit.
///
/// All numbers infer to a double-precision column. NULL samples carry no
/// usable shape and fall through to text.
#[must_use]
pub fn infer_column_type(value: &DbValue) -> ColumnType {
    // Order matters!
    match value {
        DbValue::Bool(_) => ColumnType::Boolean,
        DbValue::Integer(_) | DbValue::Double(_) => ColumnType::Double,
        DbValue::DateTime(_) => ColumnType::Timestamp,
        DbValue::Date(_) => ColumnType::Date,
        DbValue::Text(_) | DbValue::Null(_) => ColumnType::Text,
    }
}

/// Synthesize a table schema from a sample row.
///
/// With explicit `primary_key_columns`, those become the (inference-typed)
/// primary key and the remaining sample keys ordinary columns. With none, a
/// synthetic auto-increment integer key is prepended, renamed until it does
/// not collide with a sample key, and every sample key becomes an ordinary
/// column.
pub fn schema_from_sample(
    name: &str,
    sample: &Row,
    primary_key_columns: &[String],
) -> Result<TableSchema> {
    let mut columns = Vec::with_capacity(sample.len() + 1);
    let mut primary_key = Vec::new();

    if primary_key_columns.is_empty() {
        let key = synthetic_key_name(sample);
        columns.push(ColumnDef::identity_key(key.clone()));
        primary_key.push(key);
        for (column, value) in sample.iter() {
            columns.push(ColumnDef::new(column.clone(), infer_column_type(value)));
        }
    } else {
        for column in primary_key_columns {
            let value = sample.get(column).ok_or_else(|| {
                DbError::Config(format!(
                    "primary key column {} is missing from the sample row for table {}",
                    column, name
                ))
            })?;
            columns.push(ColumnDef::key(column.clone(), infer_column_type(value)));
            primary_key.push(column.clone());
        }
        for (column, value) in sample.iter() {
            if !primary_key_columns.contains(column) {
                columns.push(ColumnDef::new(column.clone(), infer_column_type(value)));
            }
        }
    }

    Ok(TableSchema {
        name: name.to_string(),
        columns,
        primary_key,
    })
}

/// Pick a synthetic key name that does not collide with any sample key.
///
/// Starts at `id` and appends underscores until the name is free.
fn synthetic_key_name(sample: &Row) -> String {
    let mut name = String::from("id");
    while sample.contains_column(&name) {
        name.push('_');
    }
    name
}
