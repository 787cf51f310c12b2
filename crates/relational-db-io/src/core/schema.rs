//! Table and column metadata types.
//!
//! These types are a database-agnostic description of a table's shape, either
//! loaded from a live database catalog or synthesized from a sample row.

use serde::{Deserialize, Serialize};

/// Column type tags understood by every supported dialect.
///
/// The tag is coarse on purpose: it captures what the connector needs to
/// render DDL and decode result rows, not the full width/precision detail of
/// any particular backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Boolean,
    Integer,
    Double,
    Timestamp,
    Date,
    /// Text fallback. Rendered unbounded on dialects that allow it and as a
    /// bounded VARCHAR otherwise.
    Text,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,

    /// Column type tag.
    pub column_type: ColumnType,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Whether the column is auto-increment/identity. Identity columns are
    /// rendered with the dialect's auto-increment syntax and may be omitted
    /// from inserts.
    pub is_identity: bool,
}

impl ColumnDef {
    /// Create a nullable, non-identity column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            is_nullable: true,
            is_identity: false,
        }
    }

    /// Create a NOT NULL key column.
    pub fn key(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            is_nullable: false,
            is_identity: false,
        }
    }

    /// Create an auto-increment integer key column.
    pub fn identity_key(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Integer,
            is_nullable: false,
            is_identity: true,
        }
    }
}

/// Table metadata: name, ordered columns, and primary-key column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,

    /// Column definitions in table order.
    pub columns: Vec<ColumnDef>,

    /// Primary key column names, in key order. Empty for keyless tables.
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Create a schema with no primary key.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: Vec::new(),
        }
    }

    /// Set the primary key column names.
    #[must_use]
    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Column names in table order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Check if the table has a primary key.
    #[must_use]
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Check if the named column is part of the primary key.
    #[must_use]
    pub fn is_key_column(&self, name: &str) -> bool {
        self.primary_key.iter().any(|c| c == name)
    }

    /// Find a column definition by name.
    #[must_use]
    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}
