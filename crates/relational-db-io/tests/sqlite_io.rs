//! End-to-end tests against on-disk SQLite databases.
//!
//! SQLite needs no server, so the full session lifecycle runs for real here:
//! database creation, schema inference, table creation, writes, streamed
//! reads, and the rollback-and-close path on write failure.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;
use tokio::sync::mpsc;

use relational_db_io::{
    ColumnDef, ColumnType, DbError, DbValue, Dialect, InsertBuilder, InsertStatement, NullType,
    RelationalDb, Row, SourceConfig, TableConfig, TableSchema,
};

fn sqlite_source(dir: &TempDir) -> SourceConfig {
    let path = dir.path().join("pipeline.sqlite3");
    SourceConfig::new("sqlite", path.to_string_lossy()).with_create_if_missing(true)
}

async fn open_db(dir: &TempDir) -> RelationalDb {
    let mut db = RelationalDb::new(sqlite_source(dir)).expect("valid config");
    db.start().await.expect("start session");
    db
}

async fn collect_rows(mut rx: mpsc::Receiver<relational_db_io::Result<Row>>) -> Vec<Row> {
    let mut rows = Vec::new();
    while let Some(row) = rx.recv().await {
        rows.push(row.expect("row decodes"));
    }
    rows
}

fn students_config() -> TableConfig {
    TableConfig::new("students")
        .with_create_if_missing(true)
        .with_primary_key_columns(["id"])
}

fn jack() -> Row {
    Row::new().with("id", 3).with("name", "Jack3").with("age", 23)
}

#[tokio::test]
async fn round_trip_with_explicit_primary_key() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir).await;

    db.write(&students_config(), &jack()).await.unwrap();

    let rows = collect_rows(db.read("students").await.unwrap()).await;
    assert_eq!(rows.len(), 1);

    // Numbers land in double-precision columns under inference.
    assert_eq!(rows[0].get("id"), Some(&DbValue::Double(3.0)));
    assert_eq!(rows[0].get("name"), Some(&DbValue::Text("Jack3".to_string())));
    assert_eq!(rows[0].get("age"), Some(&DbValue::Double(23.0)));

    db.close().await;
}

#[tokio::test]
async fn round_trip_multiple_rows() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir).await;

    let config = students_config();
    for (id, name) in [(1, "Ann"), (2, "Ben"), (3, "Cat")] {
        let row = Row::new().with("id", id).with("name", name).with("age", 20 + id);
        db.write(&config, &row).await.unwrap();
    }

    let mut rows = collect_rows(db.read("students").await.unwrap()).await;
    rows.sort_by(|a, b| {
        let key = |r: &Row| match r.get("id") {
            Some(DbValue::Double(v)) => *v as i64,
            _ => 0,
        };
        key(a).cmp(&key(b))
    });

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("name"), Some(&DbValue::Text("Ann".to_string())));
    assert_eq!(rows[2].get("age"), Some(&DbValue::Double(23.0)));

    db.close().await;
}

#[tokio::test]
async fn read_is_restartable_per_call() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir).await;
    db.write(&students_config(), &jack()).await.unwrap();

    let first = collect_rows(db.read("students").await.unwrap()).await;
    let second = collect_rows(db.read("students").await.unwrap()).await;
    assert_eq!(first.len(), 1);
    assert_eq!(first, second);

    db.close().await;
}

#[tokio::test]
async fn synthetic_key_is_added_when_no_key_columns_configured() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir).await;

    let config = TableConfig::new("people").with_create_if_missing(true);
    let row = Row::new().with("name", "Jack3").with("age", 23);
    db.write(&config, &row).await.unwrap();
    db.write(&config, &row).await.unwrap();

    let mut rows = collect_rows(db.read("people").await.unwrap()).await;
    rows.sort_by_key(|r| match r.get("id") {
        Some(DbValue::Integer(v)) => *v,
        _ => 0,
    });

    // The auto-increment key is assigned by the database and read back as an
    // ordinary column.
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("id"), Some(&DbValue::Integer(1)));
    assert_eq!(rows[1].get("id"), Some(&DbValue::Integer(2)));
    assert_eq!(rows[0].get("name"), Some(&DbValue::Text("Jack3".to_string())));

    db.close().await;
}

#[tokio::test]
async fn synthetic_key_renamed_to_avoid_sample_collision() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir).await;

    let config = TableConfig::new("events").with_create_if_missing(true);
    let row = Row::new().with("id", 99).with("kind", "login");
    db.write(&config, &row).await.unwrap();

    let rows = collect_rows(db.read("events").await.unwrap()).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id_"), Some(&DbValue::Integer(1)));
    assert_eq!(rows[0].get("id"), Some(&DbValue::Double(99.0)));

    db.close().await;
}

#[tokio::test]
async fn read_missing_table_is_a_resolution_error() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir).await;

    let err = db.read("absent").await.unwrap_err();
    assert!(matches!(err, DbError::TableResolution(name) if name == "absent"));

    db.close().await;
}

#[tokio::test]
async fn write_without_create_flag_is_a_resolution_error() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir).await;

    let config = TableConfig::new("students");
    let err = db.write(&config, &jack()).await.unwrap_err();
    assert!(matches!(err, DbError::TableResolution(_)));

    // Nothing was created, and the session survived.
    assert!(db.is_open());
    let err = db.read("students").await.unwrap_err();
    assert!(matches!(err, DbError::TableResolution(_)));

    db.close().await;
}

#[tokio::test]
async fn duplicate_key_fails_and_leaves_existing_row_unchanged() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir).await;

    let config = students_config();
    db.write(&config, &jack()).await.unwrap();

    // Same primary key under the plain-insert strategy.
    let conflict = Row::new().with("id", 3).with("name", "Impostor").with("age", 99);
    let err = db.write(&config, &conflict).await.unwrap_err();
    assert!(matches!(err, DbError::Write { .. }));

    // The failed write closed the session.
    assert!(!db.is_open());
    assert!(matches!(
        db.read("students").await.unwrap_err(),
        DbError::SessionClosed
    ));

    db.start().await.unwrap();
    let rows = collect_rows(db.read("students").await.unwrap()).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&DbValue::Text("Jack3".to_string())));
    assert_eq!(rows[0].get("age"), Some(&DbValue::Double(23.0)));

    db.close().await;
}

#[tokio::test]
async fn null_values_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir).await;

    let config = students_config();
    let row = Row::new()
        .with("id", 7)
        .with("name", DbValue::Null(NullType::Text))
        .with("age", 31);
    db.write(&config, &row).await.unwrap();

    let rows = collect_rows(db.read("students").await.unwrap()).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&DbValue::Null(NullType::Text)));

    db.close().await;
}

#[tokio::test]
async fn dates_and_timestamps_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir).await;

    let born: NaiveDate = "2001-05-20".parse().unwrap();
    let seen: NaiveDateTime = "2024-02-29T08:30:00".parse().unwrap();

    let config = students_config();
    let row = Row::new().with("id", 1).with("born", born).with("last_seen", seen);
    db.write(&config, &row).await.unwrap();

    let rows = collect_rows(db.read("students").await.unwrap()).await;
    assert_eq!(rows[0].get("born"), Some(&DbValue::Date(born)));
    assert_eq!(rows[0].get("last_seen"), Some(&DbValue::DateTime(seen)));

    db.close().await;
}

#[tokio::test]
async fn custom_insert_builder_overrides_the_default_strategy() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir).await;

    // SQLite has no dialect-default upsert; this builder supplies one.
    let builder: InsertBuilder = Arc::new(|schema, row| {
        let dialect = Dialect::Sqlite;
        let columns = row
            .columns()
            .map(|c| dialect.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=row.len())
            .map(|i| dialect.param_placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");
        InsertStatement {
            sql: format!(
                "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
                dialect.quote_ident(&schema.name),
                columns,
                placeholders
            ),
            params: row.iter().map(|(_, value)| value.clone()).collect(),
        }
    });

    let config = students_config().with_insert_builder(builder);
    db.write(&config, &jack()).await.unwrap();

    let replacement = Row::new().with("id", 3).with("name", "Jill").with("age", 24);
    db.write(&config, &replacement).await.unwrap();

    let rows = collect_rows(db.read("students").await.unwrap()).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&DbValue::Text("Jill".to_string())));
    assert_eq!(rows[0].get("age"), Some(&DbValue::Double(24.0)));

    db.close().await;
}

#[tokio::test]
async fn explicit_schema_definition_overrides_inference() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir).await;

    let config = TableConfig::new("students")
        .with_create_if_missing(true)
        .with_schema_fn(Arc::new(|| {
            TableSchema::new(
                "students",
                vec![
                    ColumnDef::key("code", ColumnType::Text),
                    ColumnDef::new("enrolled", ColumnType::Boolean),
                ],
            )
            .with_primary_key(["code"])
        }));

    let row = Row::new().with("code", "s-3").with("enrolled", true);
    db.write(&config, &row).await.unwrap();

    let rows = collect_rows(db.read("students").await.unwrap()).await;
    assert_eq!(rows[0].get("code"), Some(&DbValue::Text("s-3".to_string())));
    assert_eq!(rows[0].get("enrolled"), Some(&DbValue::Bool(true)));

    db.close().await;
}

#[tokio::test]
async fn second_session_loads_the_schema_from_the_catalog() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir).await;
    db.write(&students_config(), &jack()).await.unwrap();
    db.close().await;

    // A fresh session has an empty cache and must resolve the table from
    // what the database actually stored.
    db.start().await.unwrap();
    let rows = collect_rows(db.read("students").await.unwrap()).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&DbValue::Double(3.0)));
    assert_eq!(rows[0].get("name"), Some(&DbValue::Text("Jack3".to_string())));

    db.close().await;
}

#[tokio::test]
async fn missing_database_without_create_flag_fails_at_start() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.sqlite3");
    let source = SourceConfig::new("sqlite", path.to_string_lossy());

    let mut db = RelationalDb::new(source).unwrap();
    assert!(db.start().await.is_err());
}
