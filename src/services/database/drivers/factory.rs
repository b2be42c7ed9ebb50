//! Engine factory for creating SQL engines.
//!
//! The factory pattern lets the session build a fresh engine from whatever
//! the host handed it, without knowing the concrete driver type.

use anyhow::Result;

use super::sqlite::SqliteEngine;
use crate::services::database::traits::{BoxedEngine, SqlEngine};

/// What a new engine should be built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSource {
    /// A fresh, empty in-memory database
    Empty,
    /// A serialized database image, e.g. an uploaded file
    Bytes(Vec<u8>),
}

impl EngineSource {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            EngineSource::Empty => "empty",
            EngineSource::Bytes(_) => "bytes",
        }
    }
}

/// Factory for creating engines.
///
/// # Example
///
/// ```ignore
/// use liteview::services::database::drivers::{EngineFactory, EngineSource};
///
/// let bytes = async_fs::read("chinook.db").await?;
/// let engine = EngineFactory::open(EngineSource::Bytes(bytes)).await?;
/// ```
pub struct EngineFactory;

impl EngineFactory {
    /// Create a new engine from the given source.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The in-memory database cannot be opened
    /// - The bytes are not a SQLite database image
    pub async fn open(source: EngineSource) -> Result<BoxedEngine> {
        let label = source.label();
        let engine = match source {
            EngineSource::Empty => SqliteEngine::create_empty().await?,
            EngineSource::Bytes(bytes) => SqliteEngine::from_bytes(&bytes).await?,
        };

        tracing::info!(
            engine = engine.engine_name(),
            source = label,
            "Opened engine"
        );

        Ok(engine.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::traits::SchemaIntrospection;

    #[test]
    fn test_factory_opens_empty_engine() {
        smol::block_on(async {
            let engine = EngineFactory::open(EngineSource::Empty).await.unwrap();
            assert_eq!(engine.engine_name(), "sqlite");
            assert!(engine.is_open().await);
            assert!(engine.catalog().await.unwrap().is_empty());
        });
    }

    #[test]
    fn test_factory_rejects_invalid_bytes() {
        smol::block_on(async {
            let result = EngineFactory::open(EngineSource::Bytes(b"not a database".repeat(64))).await;
            assert!(result.is_err());
        });
    }

    #[test]
    fn test_source_label() {
        assert_eq!(EngineSource::Empty.label(), "empty");
        assert_eq!(EngineSource::Bytes(vec![]).label(), "bytes");
    }
}
