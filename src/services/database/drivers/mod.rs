//! Engine driver implementations.
//!
//! - **SQLite**: Embedded SQLite support via SQLx
//!
//! Each driver implements the `SqlEngine` and `SchemaIntrospection` traits.

mod factory;
pub mod sqlite;

pub use factory::{EngineFactory, EngineSource};
