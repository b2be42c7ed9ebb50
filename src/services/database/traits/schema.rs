//! Schema catalog types and the introspection trait.
//!
//! Descriptors are rebuilt wholesale from the engine catalog whenever the
//! schema may have changed. They are never patched in place.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::engine::SqlEngine;

/// Row-identity reference used when a table has no usable primary key column.
pub const ROWID_SENTINEL: &str = "_rowid_";

/// Whether a catalog entry is a base table or a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Table,
    View,
}

impl TableKind {
    /// Parse the `type` column of `sqlite_master`.
    pub fn from_catalog_type(value: &str) -> Option<Self> {
        match value {
            "table" => Some(Self::Table),
            "view" => Some(Self::View),
            _ => None,
        }
    }
}

/// One column of a table or view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    /// Ordinal position (0-indexed)
    pub cid: i64,
    /// Column name
    pub name: String,
    /// Declared type, free-form and possibly empty
    pub declared_type: String,
    /// Default value expression
    pub default_value: Option<String>,
    /// Whether the column accepts NULL from an edit form
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
}

/// A raw `table_info` row before primary key and foreign key resolution.
#[derive(Debug, Clone)]
pub struct ColumnInfoRow {
    pub cid: i64,
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    /// Position within the primary key (1-based), 0 if not part of it
    pub pk_position: i64,
}

/// A table or view with its columns and resolved primary key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    /// Column used to address single rows, `_rowid_`, or `None` for views
    pub primary_key: Option<String>,
    pub kind: TableKind,
    /// Declared `WITHOUT ROWID`; such tables have no `_rowid_` to fall back on
    #[serde(default)]
    pub without_rowid: bool,
}

impl TableDescriptor {
    /// Build a descriptor from raw column rows and the set of columns that
    /// take part in any foreign key.
    pub fn from_columns(
        name: String,
        kind: TableKind,
        rows: Vec<ColumnInfoRow>,
        foreign_key_columns: &HashSet<String>,
    ) -> Self {
        Self::build(name, kind, false, rows, foreign_key_columns)
    }

    /// Same as `from_columns`, for a table declared `WITHOUT ROWID`.
    pub fn without_rowid_from_columns(
        name: String,
        rows: Vec<ColumnInfoRow>,
        foreign_key_columns: &HashSet<String>,
    ) -> Self {
        Self::build(name, TableKind::Table, true, rows, foreign_key_columns)
    }

    fn build(
        name: String,
        kind: TableKind,
        without_rowid: bool,
        rows: Vec<ColumnInfoRow>,
        foreign_key_columns: &HashSet<String>,
    ) -> Self {
        let primary_key = resolve_primary_key(kind, without_rowid, &rows);

        let columns = rows
            .into_iter()
            .map(|row| {
                let is_primary_key = row.pk_position > 0;
                ColumnDescriptor {
                    is_foreign_key: foreign_key_columns.contains(&row.name),
                    is_nullable: !row.not_null && !is_primary_key,
                    cid: row.cid,
                    name: row.name,
                    declared_type: row.declared_type,
                    default_value: row.default_value,
                    is_primary_key,
                }
            })
            .collect();

        Self {
            name,
            columns,
            primary_key,
            kind,
            without_rowid,
        }
    }

    /// Check if this is a view
    pub fn is_view(&self) -> bool {
        self.kind == TableKind::View
    }

    /// Get a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in ordinal order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Resolve which column addresses single rows.
///
/// Views have no row identity. A single-column primary key is used as is.
/// Rowid tables without a primary key, or with a composite one, fall back to
/// the engine's row identity so that one key value always names one row.
/// `WITHOUT ROWID` tables have no such identity and use the first column of
/// their primary key.
pub fn resolve_primary_key(
    kind: TableKind,
    without_rowid: bool,
    rows: &[ColumnInfoRow],
) -> Option<String> {
    if kind == TableKind::View {
        return None;
    }

    let mut pk_columns = rows.iter().filter(|r| r.pk_position > 0);
    match (pk_columns.next(), pk_columns.next()) {
        (Some(only), None) => Some(only.name.clone()),
        _ if without_rowid => rows
            .iter()
            .find(|r| r.pk_position == 1)
            .map(|r| r.name.clone()),
        _ => Some(ROWID_SENTINEL.to_string()),
    }
}

/// Information about an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDescriptor {
    /// Index name
    pub name: String,
    /// Table the index belongs to
    pub table_name: String,
}

impl IndexDescriptor {
    pub fn new(name: String, table_name: String) -> Self {
        Self { name, table_name }
    }
}

/// The whole catalog at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    /// Tables and views, in catalog order
    pub tables: Vec<TableDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
    /// First table or view in catalog order
    pub first_table: Option<String>,
}

impl CatalogSnapshot {
    /// Create a snapshot; `first_table` is derived from `tables`.
    pub fn new(tables: Vec<TableDescriptor>, indexes: Vec<IndexDescriptor>) -> Self {
        let first_table = tables.first().map(|t| t.name.clone());
        Self {
            tables,
            indexes,
            first_table,
        }
    }

    /// Look up a table or view by name
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Check if the catalog has no tables or views
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Get all indexes for a table
    pub fn indexes_for(&self, table: &str) -> Vec<&IndexDescriptor> {
        self.indexes.iter().filter(|i| i.table_name == table).collect()
    }
}

/// Trait for engines that can describe their own catalog.
///
/// This extends `SqlEngine` with the catalog refresh the session performs
/// after opening a database and after every structural statement.
#[async_trait]
pub trait SchemaIntrospection: SqlEngine {
    /// Read tables, views, columns, keys and indexes from the catalog.
    ///
    /// An empty database yields an empty snapshot, not an error.
    async fn catalog(&self) -> Result<CatalogSnapshot>;

    /// Get the raw column rows for a table or view.
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfoRow>>;

    /// Get the names of columns that take part in any foreign key.
    async fn foreign_key_columns(&self, table: &str) -> Result<HashSet<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(cid: i64, name: &str, not_null: bool, pk_position: i64) -> ColumnInfoRow {
        ColumnInfoRow {
            cid,
            name: name.to_string(),
            declared_type: "INTEGER".to_string(),
            not_null,
            default_value: None,
            pk_position,
        }
    }

    #[test]
    fn test_single_primary_key() {
        let rows = vec![column(0, "id", false, 1), column(1, "name", true, 0)];
        assert_eq!(
            resolve_primary_key(TableKind::Table, false, &rows),
            Some("id".to_string())
        );
    }

    #[test]
    fn test_missing_primary_key_uses_sentinel() {
        let rows = vec![column(0, "a", false, 0), column(1, "b", false, 0)];
        assert_eq!(
            resolve_primary_key(TableKind::Table, false, &rows),
            Some(ROWID_SENTINEL.to_string())
        );
    }

    #[test]
    fn test_composite_primary_key_uses_sentinel() {
        let rows = vec![column(0, "a", true, 1), column(1, "b", true, 2)];
        assert_eq!(
            resolve_primary_key(TableKind::Table, false, &rows),
            Some(ROWID_SENTINEL.to_string())
        );
    }

    #[test]
    fn test_without_rowid_composite_key_uses_first_column() {
        let rows = vec![
            column(0, "b", true, 2),
            column(1, "a", true, 1),
            column(2, "v", false, 0),
        ];
        assert_eq!(
            resolve_primary_key(TableKind::Table, true, &rows),
            Some("a".to_string())
        );

        let table = TableDescriptor::without_rowid_from_columns("kv".into(), rows, &HashSet::new());
        assert!(table.without_rowid);
        assert_eq!(table.primary_key.as_deref(), Some("a"));
    }

    #[test]
    fn test_view_has_no_primary_key() {
        let rows = vec![column(0, "id", false, 0)];
        assert_eq!(resolve_primary_key(TableKind::View, false, &rows), None);
    }

    #[test]
    fn test_primary_key_is_never_nullable() {
        let rows = vec![
            column(0, "id", false, 1),
            column(1, "email", true, 0),
            column(2, "phone", false, 0),
        ];
        let fks = HashSet::from(["phone".to_string()]);
        let table = TableDescriptor::from_columns("t".to_string(), TableKind::Table, rows, &fks);

        let id = table.column("id").unwrap();
        assert!(id.is_primary_key);
        assert!(!id.is_nullable);
        assert!(!table.column("email").unwrap().is_nullable);

        let phone = table.column("phone").unwrap();
        assert!(phone.is_nullable);
        assert!(phone.is_foreign_key);
    }

    #[test]
    fn test_snapshot_first_table() {
        assert_eq!(CatalogSnapshot::new(vec![], vec![]).first_table, None);

        let tables = vec![
            TableDescriptor::from_columns("b".into(), TableKind::Table, vec![], &HashSet::new()),
            TableDescriptor::from_columns("a".into(), TableKind::View, vec![], &HashSet::new()),
        ];
        let snapshot = CatalogSnapshot::new(tables, vec![]);
        assert_eq!(snapshot.first_table.as_deref(), Some("b"));
        assert!(snapshot.table("a").unwrap().is_view());
    }
}
