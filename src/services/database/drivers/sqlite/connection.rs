//! SQLite engine implementation.
//!
//! This module implements the `SqlEngine` trait for SQLite using a single
//! SQLx `SqliteConnection`. One engine owns exactly one database, kept in a
//! private temporary file that is either created empty or materialized from
//! uploaded bytes.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use async_lock::Mutex;
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Either, Executor, Row, Sqlite};
use tempfile::TempDir;

use super::types::SqliteValueConverter;
use crate::services::database::traits::{BoxedEngine, ResultSet, SqlEngine, Value};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// File name used for databases materialized from bytes.
const DATABASE_FILE: &str = "database.sqlite";

/// File name used as the target of `VACUUM INTO` during export.
const EXPORT_FILE: &str = "export.sqlite";

/// SQLite engine.
///
/// Wraps a single SQLx connection rather than a pool.
pub struct SqliteEngine {
    connection: Mutex<Option<sqlx::SqliteConnection>>,
    /// Directory holding the backing file; `None` once closed
    storage: Option<TempDir>,
}

impl std::fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEngine")
            .field("connection", &"<SqliteConnection>")
            .field("storage", &self.storage.as_ref().map(|dir| dir.path()))
            .finish()
    }
}

impl SqliteEngine {
    /// Create an engine over a fresh, empty database.
    ///
    /// The database lives in a private temporary file; `VACUUM INTO` writes
    /// nothing when the source is a memory database.
    pub async fn create_empty() -> Result<Self> {
        let storage = tempfile::tempdir().context("Failed to create database storage")?;
        let path = storage.path().join(DATABASE_FILE);

        let engine = Self::open_in(storage, &path, true)
            .await
            .context("Failed to create empty database")?;

        tracing::debug!("Created empty SQLite engine");
        Ok(engine)
    }

    /// Create an engine over a copy of a serialized database image.
    ///
    /// The bytes are written to a private temporary file that is removed when
    /// the engine is closed or dropped. Bytes that are not a SQLite database
    /// are rejected here rather than on first use.
    pub async fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let storage = tempfile::tempdir().context("Failed to create database storage")?;
        let path = storage.path().join(DATABASE_FILE);
        async_fs::write(&path, bytes)
            .await
            .context("Failed to write database file")?;

        let engine = Self::open_in(storage, &path, false).await?;

        tracing::debug!(size = bytes.len(), "Opened SQLite engine from bytes");
        Ok(engine)
    }

    async fn open_in(storage: TempDir, path: &Path, create: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Delete)
            .foreign_keys(true);
        let mut connection = options
            .connect()
            .await
            .context("Failed to open database file")?;

        // The header is only checked on first read
        sqlx::query("SELECT COUNT(*) FROM sqlite_master")
            .fetch_one(&mut connection)
            .await
            .context("File is not a valid SQLite database")?;

        Ok(Self {
            connection: Mutex::new(Some(connection)),
            storage: Some(storage),
        })
    }

    /// Create a boxed engine (for factory use).
    pub fn boxed(self) -> BoxedEngine {
        Box::new(self)
    }

    /// Bind one value to a query, mapping each storage class to its SQLx type.
    fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
        match value {
            Value::Null => query.bind(None::<String>),
            Value::Integer(v) => query.bind(*v),
            Value::Real(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
            Value::Blob(v) => query.bind(v.clone()),
        }
    }

    fn prepare<'q>(sql: &'q str, params: &[Value]) -> SqliteQuery<'q> {
        params
            .iter()
            .fold(sqlx::query(sql), |query, value| Self::bind_value(query, value))
    }

    /// Run a bound statement and return the raw SQLx rows.
    ///
    /// Used by the schema module, which reads catalog columns by name.
    pub(crate) async fn fetch_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<SqliteRow>> {
        let mut guard = self.connection.lock().await;
        let connection = guard
            .as_mut()
            .ok_or_else(|| anyhow!("Database not connected"))?;

        let rows = Self::prepare(sql, params).fetch_all(&mut *connection).await?;
        Ok(rows)
    }

    fn column_names(row: &SqliteRow) -> Vec<String> {
        row.columns().iter().map(|c| c.name().to_string()).collect()
    }

    async fn vacuum_into(&self, target: &Path) -> Result<()> {
        let target = target
            .to_str()
            .ok_or_else(|| anyhow!("Export path is not valid UTF-8"))?;
        let sql = format!("VACUUM INTO '{}'", target.replace('\'', "''"));

        let mut guard = self.connection.lock().await;
        let connection = guard
            .as_mut()
            .ok_or_else(|| anyhow!("Database not connected"))?;
        connection.execute(sql.as_str()).await?;
        Ok(())
    }
}

#[async_trait]
impl SqlEngine for SqliteEngine {
    fn engine_name(&self) -> &'static str {
        "sqlite"
    }

    async fn execute(&self, script: &str) -> Result<Vec<ResultSet>> {
        let mut guard = self.connection.lock().await;
        let connection = guard
            .as_mut()
            .ok_or_else(|| anyhow!("Database not connected"))?;

        let mut results = Vec::new();
        let mut columns: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<Value>> = Vec::new();

        let mut stream = sqlx::raw_sql(script).fetch_many(&mut *connection);
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(_done) => {
                    // End of one statement
                    if !rows.is_empty() {
                        results.push(ResultSet::new(
                            std::mem::take(&mut columns),
                            std::mem::take(&mut rows),
                        ));
                    }
                }
                Either::Right(row) => {
                    if rows.is_empty() {
                        columns = Self::column_names(&row);
                    }
                    rows.push(SqliteValueConverter::convert_row(&row));
                }
            }
        }

        if !rows.is_empty() {
            results.push(ResultSet::new(columns, rows));
        }

        Ok(results)
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        let mut guard = self.connection.lock().await;
        let connection = guard
            .as_mut()
            .ok_or_else(|| anyhow!("Database not connected"))?;

        let sqlite_rows = Self::prepare(sql, params)
            .fetch_all(&mut *connection)
            .await?;

        let columns = match sqlite_rows.first() {
            Some(row) => Self::column_names(row),
            None => {
                // No row to read names from; ask the prepared statement instead
                let described = (&mut *connection).describe(sql).await?;
                described
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            }
        };

        let rows = sqlite_rows
            .iter()
            .map(SqliteValueConverter::convert_row)
            .collect();

        Ok(ResultSet::new(columns, rows))
    }

    async fn run(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let mut guard = self.connection.lock().await;
        let connection = guard
            .as_mut()
            .ok_or_else(|| anyhow!("Database not connected"))?;

        let result = Self::prepare(sql, params).execute(&mut *connection).await?;
        Ok(result.rows_affected())
    }

    async fn export_bytes(&self) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir().context("Failed to create export directory")?;
        let target = scratch.path().join(EXPORT_FILE);

        self.vacuum_into(&target)
            .await
            .context("Failed to serialize database")?;

        let bytes = async_fs::read(&target)
            .await
            .context("Failed to read exported database")?;

        tracing::debug!(size = bytes.len(), "Exported SQLite database");
        Ok(bytes)
    }

    async fn close(&mut self) -> Result<()> {
        let connection = self.connection.get_mut().take();
        if let Some(connection) = connection {
            connection.close().await?;
        }

        if let Some(storage) = self.storage.take() {
            storage
                .close()
                .context("Failed to remove database storage")?;
        }

        tracing::debug!("Closed SQLite engine");
        Ok(())
    }

    async fn is_open(&self) -> bool {
        let mut guard = self.connection.lock().await;
        match guard.as_mut() {
            Some(connection) => connection.ping().await.is_ok(),
            None => false,
        }
    }
}
