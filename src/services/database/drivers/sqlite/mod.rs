//! SQLite engine implementation.
//!
//! This module provides the SQLite engine that implements the `SqlEngine`
//! and `SchemaIntrospection` traits using SQLx.
//!
//! An engine is constructed one of two ways:
//! - Empty, in memory (`SqliteEngine::create_empty`)
//! - From a serialized database image (`SqliteEngine::from_bytes`)
//!
//! # Example
//!
//! ```ignore
//! use liteview::services::database::drivers::sqlite::SqliteEngine;
//! use liteview::services::database::traits::{SchemaIntrospection, SqlEngine};
//!
//! let engine = SqliteEngine::create_empty().await?;
//! engine.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)").await?;
//!
//! let catalog = engine.catalog().await?;
//! assert_eq!(catalog.first_table.as_deref(), Some("t"));
//!
//! let image = engine.export_bytes().await?;
//! let copy = SqliteEngine::from_bytes(&image).await?;
//! ```

mod connection;
mod schema;
mod types;

pub use connection::SqliteEngine;
