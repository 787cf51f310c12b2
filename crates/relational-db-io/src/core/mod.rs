//! Core abstractions shared by every backend driver.
//!
//! - [`value`]: scalar values and the `Row` mapping
//! - [`schema`]: table and column metadata
//! - [`infer`]: sample-based type inference and schema synthesis
//! - [`traits`]: the session trait implemented per driver

pub mod infer;
pub mod schema;
pub mod traits;
pub mod value;

pub use infer::{infer_column_type, schema_from_sample};
pub use schema::{ColumnDef, ColumnType, TableSchema};
pub use traits::DbDriver;
pub use value::{DbValue, NullType, Row};
