//! Row-level insert, update and delete.
//!
//! Rows are addressed through the primary key resolved by the catalog. All
//! values are bound; only quoted identifiers appear in the SQL text. A
//! successful mutation drops every cached page of the table before returning.

use serde::Serialize;

use super::cache::ResultCache;
use super::query_builder::{primary_key_expr, quote_identifier};
use crate::errors::{Result, SessionError};
use crate::services::database::traits::{CatalogSnapshot, SqlEngine, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Insert => "insert",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phrase = match self {
            MutationKind::Insert => "inserting into",
            MutationKind::Update => "updating",
            MutationKind::Delete => "deleting from",
        };
        write!(f, "{}", phrase)
    }
}

/// `INSERT INTO "t" ("a", "b") VALUES (?, ?)`
pub fn insert_statement(table: &str, columns: &[&str]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        names.join(", "),
        placeholders
    )
}

/// `UPDATE "t" SET "a" = ?, "b" = ? WHERE "pk" = ?`
pub fn update_statement(table: &str, columns: &[String], primary_key: &str) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .map(|c| format!("{} = ?", quote_identifier(c)))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ?",
        quote_identifier(table),
        assignments.join(", "),
        primary_key_expr(primary_key)
    )
}

/// `DELETE FROM "t" WHERE "pk" = ?`
pub fn delete_statement(table: &str, primary_key: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ?",
        quote_identifier(table),
        primary_key_expr(primary_key)
    )
}

/// Applies row mutations against one engine and keeps one cache coherent.
pub struct MutationEngine<'a, E: ?Sized, R> {
    engine: &'a E,
    catalog: &'a CatalogSnapshot,
    cache: &'a mut ResultCache<R>,
}

impl<'a, E, R> MutationEngine<'a, E, R>
where
    E: SqlEngine + ?Sized,
    R: Clone,
{
    pub fn new(engine: &'a E, catalog: &'a CatalogSnapshot, cache: &'a mut ResultCache<R>) -> Self {
        Self {
            engine,
            catalog,
            cache,
        }
    }

    /// Insert one row.
    ///
    /// Columns whose value is the empty string are left out so the column
    /// default applies.
    pub async fn insert(&mut self, table: &str, columns: &[String], values: &[Value]) -> Result<u64> {
        check_lengths(columns, values)?;

        let (kept_columns, kept_values): (Vec<&str>, Vec<Value>) = columns
            .iter()
            .zip(values)
            .filter(|(_, value)| !value.is_empty_text())
            .map(|(column, value)| (column.as_str(), value.clone()))
            .unzip();

        if kept_columns.is_empty() {
            return Err(SessionError::EmptyInsert(table.to_string()));
        }

        let sql = insert_statement(table, &kept_columns);
        self.apply(MutationKind::Insert, table, &sql, &kept_values).await
    }

    /// Update one row by primary key. Empty strings are written as NULL.
    pub async fn update(
        &mut self,
        table: &str,
        columns: &[String],
        values: &[Value],
        primary_value: &Value,
    ) -> Result<u64> {
        check_lengths(columns, values)?;
        let primary_key = self.primary_key(table)?;

        let mut params: Vec<Value> = values
            .iter()
            .map(|value| {
                if value.is_empty_text() {
                    Value::Null
                } else {
                    value.clone()
                }
            })
            .collect();
        params.push(primary_value.clone());

        let sql = update_statement(table, columns, &primary_key);
        self.apply(MutationKind::Update, table, &sql, &params).await
    }

    /// Delete one row by primary key.
    pub async fn delete(&mut self, table: &str, primary_value: &Value) -> Result<u64> {
        let primary_key = self.primary_key(table)?;
        let sql = delete_statement(table, &primary_key);
        self.apply(MutationKind::Delete, table, &sql, std::slice::from_ref(primary_value))
            .await
    }

    fn primary_key(&self, table: &str) -> Result<String> {
        let descriptor = self
            .catalog
            .table(table)
            .ok_or_else(|| SessionError::UnknownTable(table.to_string()))?;

        descriptor
            .primary_key
            .clone()
            .ok_or_else(|| SessionError::NoPrimaryKey(table.to_string()))
    }

    async fn apply(
        &mut self,
        operation: MutationKind,
        table: &str,
        sql: &str,
        params: &[Value],
    ) -> Result<u64> {
        tracing::debug!(operation = operation.as_str(), table, sql, "Applying mutation");

        let changed = self
            .engine
            .run(sql, params)
            .await
            .map_err(|e| SessionError::Mutation {
                operation,
                table: table.to_string(),
                message: format!("{:#}", e),
            })?;

        self.cache.invalidate_table(table);

        tracing::info!(
            operation = operation.as_str(),
            table,
            changed,
            "Mutation applied"
        );
        Ok(changed)
    }
}

fn check_lengths(columns: &[String], values: &[Value]) -> Result<()> {
    if columns.len() != values.len() {
        return Err(SessionError::ValueCountMismatch {
            columns: columns.len(),
            values: values.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::services::database::drivers::sqlite::SqliteEngine;
    use crate::services::database::traits::{ROWID_SENTINEL, SchemaIntrospection};
    use crate::services::session::cache::CacheKey;
    use crate::services::session::query_builder::{Filters, PageWindow, Sorters};

    const FIXTURE: &str = r#"
        CREATE TABLE t (id INTEGER PRIMARY KEY, a TEXT DEFAULT 'dflt', b INTEGER);
        CREATE TABLE loose (x TEXT, y TEXT);
        CREATE TABLE strict (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
        CREATE VIEW tv AS SELECT a, b FROM t;
        INSERT INTO t (id, a, b) VALUES (1, 'one', 1), (2, 'two', 2);
        INSERT INTO loose VALUES ('p', 'q'), ('r', 's');
    "#;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    async fn fixture() -> (SqliteEngine, CatalogSnapshot) {
        let engine = SqliteEngine::create_empty().await.unwrap();
        engine.execute(FIXTURE).await.unwrap();
        let catalog = engine.catalog().await.unwrap();
        (engine, catalog)
    }

    fn cache() -> ResultCache<u8> {
        ResultCache::new(10, Duration::from_secs(60))
    }

    fn page_key(table: &str) -> CacheKey {
        CacheKey::page(
            table,
            PageWindow::clamped(10, 0, 10_000),
            &Filters::new(),
            &Sorters::new(),
        )
    }

    #[test]
    fn test_statement_builders() {
        assert_eq!(
            insert_statement("t", &["a", "b\"c"]),
            r#"INSERT INTO "t" ("a", "b""c") VALUES (?, ?)"#
        );
        assert_eq!(
            update_statement("t", &columns(&["a", "b"]), "id"),
            r#"UPDATE "t" SET "a" = ?, "b" = ? WHERE "id" = ?"#
        );
        assert_eq!(
            delete_statement("t", ROWID_SENTINEL),
            r#"DELETE FROM "t" WHERE _rowid_ = ?"#
        );
    }

    #[test]
    fn test_insert_drops_empty_values() {
        smol::block_on(async {
            let (engine, catalog) = fixture().await;
            let mut cache = cache();
            let mut mutations = MutationEngine::new(&engine, &catalog, &mut cache);

            mutations
                .insert("t", &columns(&["a", "b"]), &[Value::from(""), Value::from("5")])
                .await
                .unwrap();

            let set = engine
                .query("SELECT a, b FROM t WHERE id = 3", &[])
                .await
                .unwrap();
            // Column default applied, text "5" coerced by INTEGER affinity
            assert_eq!(set.rows, vec![vec![Value::from("dflt"), Value::Integer(5)]]);

            let result = mutations
                .insert("t", &columns(&["a"]), &[Value::from("")])
                .await;
            assert!(matches!(result, Err(SessionError::EmptyInsert(t)) if t == "t"));
        });
    }

    #[test]
    fn test_update_turns_empty_into_null() {
        smol::block_on(async {
            let (engine, catalog) = fixture().await;
            let mut cache = cache();
            let mut mutations = MutationEngine::new(&engine, &catalog, &mut cache);

            let changed = mutations
                .update(
                    "t",
                    &columns(&["a", "b"]),
                    &[Value::from(""), Value::Integer(20)],
                    &Value::Integer(2),
                )
                .await
                .unwrap();
            assert_eq!(changed, 1);

            let set = engine.query("SELECT a, b FROM t WHERE id = 2", &[]).await.unwrap();
            assert_eq!(set.rows, vec![vec![Value::Null, Value::Integer(20)]]);
        });
    }

    #[test]
    fn test_rowid_tables_are_addressable() {
        smol::block_on(async {
            let (engine, catalog) = fixture().await;
            let mut cache = cache();
            let mut mutations = MutationEngine::new(&engine, &catalog, &mut cache);

            mutations.delete("loose", &Value::Integer(1)).await.unwrap();

            let set = engine.query("SELECT x FROM loose", &[]).await.unwrap();
            assert_eq!(set.rows, vec![vec![Value::from("r")]]);
        });
    }

    #[test]
    fn test_views_and_unknown_tables_are_rejected() {
        smol::block_on(async {
            let (engine, catalog) = fixture().await;
            let mut cache = cache();
            let mut mutations = MutationEngine::new(&engine, &catalog, &mut cache);

            let result = mutations.delete("tv", &Value::Integer(1)).await;
            assert!(matches!(result, Err(SessionError::NoPrimaryKey(t)) if t == "tv"));

            let result = mutations
                .update("tv", &columns(&["a"]), &[Value::from("x")], &Value::Integer(1))
                .await;
            assert!(matches!(result, Err(SessionError::NoPrimaryKey(_))));

            let result = mutations.delete("missing", &Value::Integer(1)).await;
            assert!(matches!(result, Err(SessionError::UnknownTable(_))));
        });
    }

    #[test]
    fn test_value_count_mismatch() {
        smol::block_on(async {
            let (engine, catalog) = fixture().await;
            let mut cache = cache();
            let mut mutations = MutationEngine::new(&engine, &catalog, &mut cache);

            let result = mutations
                .insert("t", &columns(&["a", "b"]), &[Value::from("x")])
                .await;
            assert!(matches!(
                result,
                Err(SessionError::ValueCountMismatch { columns: 2, values: 1 })
            ));
        });
    }

    #[test]
    fn test_engine_errors_are_wrapped() {
        smol::block_on(async {
            let (engine, catalog) = fixture().await;
            let mut cache = cache();
            cache.set(page_key("strict"), 1);
            let mut mutations = MutationEngine::new(&engine, &catalog, &mut cache);

            let result = mutations
                .update("strict", &columns(&["name"]), &[Value::Null], &Value::Integer(1))
                .await;
            // No row 1 yet, so the NOT NULL check never fires
            assert!(result.is_ok());

            mutations
                .insert("strict", &columns(&["id", "name"]), &[Value::Integer(1), Value::from("n")])
                .await
                .unwrap();
            let err = mutations
                .update("strict", &columns(&["name"]), &[Value::from("")], &Value::Integer(1))
                .await
                .unwrap_err();

            match err {
                SessionError::Mutation {
                    operation,
                    table,
                    message,
                } => {
                    assert_eq!(operation, MutationKind::Update);
                    assert_eq!(table, "strict");
                    assert!(message.contains("NOT NULL"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        });
    }

    #[test]
    fn test_success_invalidates_table_cache() {
        smol::block_on(async {
            let (engine, catalog) = fixture().await;
            let mut cache = cache();
            cache.set(page_key("t"), 1);
            cache.set(page_key("loose"), 2);

            MutationEngine::new(&engine, &catalog, &mut cache)
                .delete("t", &Value::Integer(1))
                .await
                .unwrap();

            assert_eq!(cache.get(&page_key("t")), None);
            assert_eq!(cache.get(&page_key("loose")), Some(2));
        });
    }
}
