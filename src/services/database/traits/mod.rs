//! Engine abstraction traits and types.
//!
//! This module provides the interface the session layer needs from an
//! embedded SQL engine. It defines:
//!
//! - **Row/Value** (`row`): Storage-class values and positional result sets
//! - **Engine** (`engine`): Script execution, bound statements, byte export
//! - **Schema** (`schema`): Catalog descriptors and the introspection trait
//!
//! # Example
//!
//! ```ignore
//! use liteview::services::database::traits::{SchemaIntrospection, Value};
//!
//! async fn count(engine: &dyn SchemaIntrospection) -> anyhow::Result<i64> {
//!     let set = engine.query("SELECT COUNT(*) FROM \"Orders\" WHERE quantity > ?", &[Value::Integer(1)]).await?;
//!     Ok(set.get(0, 0).and_then(Value::as_i64).unwrap_or(0))
//! }
//! ```

pub mod engine;
pub mod row;
pub mod schema;

pub use engine::{BoxedEngine, SqlEngine};

pub use row::{ResultSet, Value};

pub use schema::{
    CatalogSnapshot, ColumnDescriptor, ColumnInfoRow, IndexDescriptor, SchemaIntrospection,
    TableDescriptor, TableKind, ROWID_SENTINEL,
};
