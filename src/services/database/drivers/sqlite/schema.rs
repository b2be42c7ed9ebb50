//! SQLite schema introspection implementation.
//!
//! This module implements the `SchemaIntrospection` trait for SQLite,
//! reading `sqlite_master` and the `pragma_table_info` /
//! `pragma_foreign_key_list` table-valued functions. Table names are always
//! bound as parameters, never interpolated.

use std::collections::HashSet;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use sqlx::Row;

use super::connection::SqliteEngine;
use crate::services::database::traits::{
    CatalogSnapshot, ColumnInfoRow, IndexDescriptor, SchemaIntrospection, TableDescriptor,
    TableKind, Value,
};

const CATALOG_QUERY: &str = r#"
    SELECT type, name, tbl_name, sql
    FROM sqlite_master
    WHERE type IN ('table', 'view', 'index')
        AND name != 'sqlite_sequence'
"#;

const TABLE_INFO_QUERY: &str =
    r#"SELECT cid, name, type, "notnull", dflt_value, pk FROM pragma_table_info(?)"#;

const FOREIGN_KEY_QUERY: &str = r#"SELECT "from" FROM pragma_foreign_key_list(?)"#;

/// Whether a `CREATE TABLE` statement ends in a `WITHOUT ROWID` option.
///
/// Only the text after the closing parenthesis of the column list is
/// inspected, so column names and defaults cannot trigger a match.
fn is_without_rowid(create_sql: &str) -> bool {
    static WITHOUT_ROWID_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = WITHOUT_ROWID_REGEX
        .get_or_init(|| Regex::new(r"(?i)\bWITHOUT\s+ROWID\b").expect("valid without rowid regex"));

    create_sql
        .rfind(')')
        .is_some_and(|end| re.is_match(&create_sql[end..]))
}

#[async_trait]
impl SchemaIntrospection for SqliteEngine {
    async fn catalog(&self) -> Result<CatalogSnapshot> {
        let rows = self
            .fetch_rows(CATALOG_QUERY, &[])
            .await
            .context("Failed to read sqlite_master")?;

        let mut tables = Vec::new();
        let mut indexes = Vec::new();

        for row in rows {
            let entry_type: String = row.try_get("type")?;
            let name: String = row.try_get("name")?;
            let table_name: String = row.try_get("tbl_name")?;
            let create_sql: Option<String> = row.try_get("sql")?;

            if entry_type == "index" {
                indexes.push(IndexDescriptor::new(name, table_name));
                continue;
            }

            let Some(kind) = TableKind::from_catalog_type(&entry_type) else {
                continue;
            };

            let columns = self.table_columns(&name).await?;
            let foreign_keys = match kind {
                TableKind::Table => self.foreign_key_columns(&name).await?,
                TableKind::View => HashSet::new(),
            };

            let without_rowid =
                kind == TableKind::Table && create_sql.as_deref().is_some_and(is_without_rowid);

            tables.push(if without_rowid {
                TableDescriptor::without_rowid_from_columns(name, columns, &foreign_keys)
            } else {
                TableDescriptor::from_columns(name, kind, columns, &foreign_keys)
            });
        }

        tracing::debug!(
            tables = tables.len(),
            indexes = indexes.len(),
            "Read SQLite catalog"
        );

        Ok(CatalogSnapshot::new(tables, indexes))
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfoRow>> {
        let rows = self
            .fetch_rows(TABLE_INFO_QUERY, &[Value::from(table)])
            .await
            .with_context(|| format!("Failed to read columns of {}", table))?;

        rows.into_iter()
            .map(|row| -> Result<ColumnInfoRow> {
                let declared_type: Option<String> = row.try_get("type")?;
                let not_null: i64 = row.try_get("notnull")?;

                Ok(ColumnInfoRow {
                    cid: row.try_get("cid")?,
                    name: row.try_get("name")?,
                    declared_type: declared_type.unwrap_or_default(),
                    not_null: not_null != 0,
                    default_value: row.try_get("dflt_value")?,
                    pk_position: row.try_get("pk")?,
                })
            })
            .collect()
    }

    async fn foreign_key_columns(&self, table: &str) -> Result<HashSet<String>> {
        let rows = self
            .fetch_rows(FOREIGN_KEY_QUERY, &[Value::from(table)])
            .await
            .with_context(|| format!("Failed to read foreign keys of {}", table))?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("from").map_err(Into::into))
            .collect()
    }
}
