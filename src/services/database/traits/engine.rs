//! Core engine capability trait.
//!
//! This module defines the `SqlEngine` trait the session layer consumes. The
//! engine is a black box: it runs scripts, runs prepared statements with bound
//! parameters, and serializes its whole storage to bytes.

use anyhow::Result;
use async_trait::async_trait;

use super::row::{ResultSet, Value};
use super::schema::SchemaIntrospection;

/// Core trait for an embedded SQL engine instance.
///
/// One value of this trait owns one live database. Dropping it without calling
/// `close()` still releases the database, but `close()` reports errors.
///
/// # Example
///
/// ```ignore
/// use liteview::services::database::traits::SqlEngine;
///
/// async fn example(engine: &dyn SqlEngine) -> anyhow::Result<()> {
///     let sets = engine.execute("SELECT 1; SELECT 2").await?;
///     assert_eq!(sets.len(), 2);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SqlEngine: Send + Sync {
    /// Short name of the engine, used in logs.
    fn engine_name(&self) -> &'static str;

    /// Execute a script of one or more statements.
    ///
    /// Returns one `ResultSet` per statement that produced at least one row,
    /// in execution order. Statements that produce no rows contribute nothing.
    async fn execute(&self, script: &str) -> Result<Vec<ResultSet>>;

    /// Prepare a single statement, bind `params` positionally, and step it to
    /// completion.
    ///
    /// Unlike `execute`, the returned set always carries column names, even
    /// when no row matched.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<ResultSet>;

    /// Prepare a single statement, bind `params`, and run it for its side
    /// effects. Returns the number of rows changed.
    async fn run(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Serialize the full database to bytes.
    async fn export_bytes(&self) -> Result<Vec<u8>>;

    /// Release the database and any storage backing it.
    async fn close(&mut self) -> Result<()>;

    /// Check if the engine still holds a live database.
    async fn is_open(&self) -> bool;
}

/// A boxed engine that also exposes its catalog.
///
/// This is the only form the session layer stores.
pub type BoxedEngine = Box<dyn SchemaIntrospection>;
