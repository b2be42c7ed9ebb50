//! Session-side view of the engine catalog.
//!
//! The snapshot is replaced wholesale on every refresh. `generation` counts
//! refreshes so callers can tell whether a rebuild happened.

use anyhow::Result;

use crate::services::database::traits::{CatalogSnapshot, SchemaIntrospection, TableDescriptor};

#[derive(Debug, Default)]
pub struct SchemaCatalog {
    snapshot: CatalogSnapshot,
    generation: u64,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the engine catalog.
    ///
    /// On failure the previous snapshot is kept.
    pub async fn refresh<E>(&mut self, engine: &E) -> Result<&CatalogSnapshot>
    where
        E: SchemaIntrospection + ?Sized,
    {
        let snapshot = engine.catalog().await?;

        self.generation += 1;
        tracing::info!(
            tables = snapshot.tables.len(),
            indexes = snapshot.indexes.len(),
            first_table = snapshot.first_table.as_deref().unwrap_or(""),
            generation = self.generation,
            "Schema catalog rebuilt"
        );

        self.snapshot = snapshot;
        Ok(&self.snapshot)
    }

    /// Forget everything, e.g. when the engine is released.
    pub fn reset(&mut self) {
        self.snapshot = CatalogSnapshot::default();
    }

    pub fn snapshot(&self) -> &CatalogSnapshot {
        &self.snapshot
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.snapshot.table(name)
    }

    pub fn first_table(&self) -> Option<&str> {
        self.snapshot.first_table.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::drivers::sqlite::SqliteEngine;
    use crate::services::database::traits::SqlEngine;

    #[test]
    fn test_refresh_replaces_snapshot() {
        smol::block_on(async {
            let engine = SqliteEngine::create_empty().await.unwrap();
            let mut catalog = SchemaCatalog::new();

            catalog.refresh(&engine).await.unwrap();
            assert!(catalog.snapshot().is_empty());
            assert_eq!(catalog.first_table(), None);
            assert_eq!(catalog.generation(), 1);

            engine.execute("CREATE TABLE a (x); CREATE TABLE b (y)").await.unwrap();
            catalog.refresh(&engine).await.unwrap();
            assert_eq!(catalog.first_table(), Some("a"));
            assert!(catalog.table("b").is_some());

            engine.execute("DROP TABLE a").await.unwrap();
            catalog.refresh(&engine).await.unwrap();
            assert_eq!(catalog.first_table(), Some("b"));
            assert!(catalog.table("a").is_none());
            assert_eq!(catalog.generation(), 3);

            catalog.reset();
            assert!(catalog.snapshot().is_empty());
        });
    }
}
