//! Parameterized read query construction.
//!
//! Filter values are always bound, never spliced into SQL text. Identifiers
//! cannot be bound, so they are double-quoted with embedded quotes doubled.
//! Only the clamped integer page window is interpolated.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::MAX_PAGE_SIZE;
use crate::services::database::traits::{ROWID_SENTINEL, Value};

/// Column to substring filters.
///
/// Ordered so that two equal filter sets always serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(BTreeMap<String, String>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter for one column. An empty value clears it.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        if value.is_empty() {
            self.0.remove(&column);
        } else {
            self.0.insert(column, value);
        }
    }

    /// Filters that actually constrain the result.
    pub fn active(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(column, value)| (column.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }

    /// Copy without the empty entries, so equivalent filters compare equal.
    pub fn normalized(&self) -> Self {
        self.active().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Filters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Sort direction.
///
/// Deserialization is lenient: anything but a case-insensitive `"desc"`
/// becomes `Asc`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl<'de> Deserialize<'de> for SortOrder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(SortOrder::parse(&value))
    }
}

/// Column to sort direction.
///
/// The type allows several columns, but hosts keep at most one active sort:
/// choosing a new sort column goes through `Sorters::single`, which replaces
/// the whole set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sorters(BTreeMap<String, SortOrder>);

impl Sorters {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sort on exactly one column.
    pub fn single(column: impl Into<String>, order: SortOrder) -> Self {
        Self(BTreeMap::from([(column.into(), order)]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SortOrder)> {
        self.0.iter().map(|(column, order)| (column.as_str(), *order))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A clamped `LIMIT`/`OFFSET` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageWindow {
    pub limit: i64,
    pub offset: i64,
}

impl PageWindow {
    /// Clamp `limit` into `[1, max_limit]` and `offset` to at least zero.
    pub fn clamped(limit: i64, offset: i64, max_limit: i64) -> Self {
        let max_limit = max_limit.clamp(1, MAX_PAGE_SIZE);
        Self {
            limit: limit.clamp(1, max_limit),
            offset: offset.max(0),
        }
    }

    fn to_sql(self) -> String {
        format!("LIMIT {} OFFSET {}", self.limit, self.offset)
    }
}

/// WHERE and ORDER BY clauses plus the values bound by the WHERE clause.
///
/// Either clause is empty when there is nothing to filter or sort on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltQuery {
    pub where_clause: String,
    pub order_by_clause: String,
    pub params: Vec<Value>,
}

/// Quote an identifier, doubling any embedded double quote.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape `LIKE` wildcards so the value matches literally under `ESCAPE '\'`.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Expression that reads the row identity of a table.
///
/// The sentinel is a keyword-like name and must stay unquoted: a quoted
/// `"_rowid_"` would refer to a column of that name instead.
pub fn primary_key_expr(primary_key: &str) -> String {
    if primary_key == ROWID_SENTINEL {
        ROWID_SENTINEL.to_string()
    } else {
        quote_identifier(primary_key)
    }
}

/// Builder for the read queries a session issues.
pub struct QueryBuilder;

impl QueryBuilder {
    /// Build WHERE and ORDER BY clauses from filters and sorters.
    pub fn build(filters: &Filters, sorters: &Sorters) -> BuiltQuery {
        let mut predicates = Vec::new();
        let mut params = Vec::new();

        for (column, value) in filters.active() {
            predicates.push(format!("{} LIKE ? ESCAPE '\\'", quote_identifier(column)));
            params.push(Value::Text(format!("%{}%", escape_like(value))));
        }

        let where_clause = if predicates.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", predicates.join(" AND "))
        };

        let order_by_clause = if sorters.is_empty() {
            String::new()
        } else {
            let terms: Vec<String> = sorters
                .iter()
                .map(|(column, order)| format!("{} {}", quote_identifier(column), order.as_sql()))
                .collect();
            format!("ORDER BY {}", terms.join(", "))
        };

        BuiltQuery {
            where_clause,
            order_by_clause,
            params,
        }
    }

    /// Page read. The primary key, when present, is projected first.
    pub fn select_page(
        table: &str,
        primary_key: Option<&str>,
        built: &BuiltQuery,
        window: PageWindow,
    ) -> String {
        let projection = match primary_key {
            Some(pk) => format!("{}, *", primary_key_expr(pk)),
            None => "*".to_string(),
        };

        Self::assemble(&[
            format!("SELECT {} FROM {}", projection, quote_identifier(table)),
            built.where_clause.clone(),
            built.order_by_clause.clone(),
            window.to_sql(),
        ])
    }

    /// Total row count under the same filters.
    pub fn count(table: &str, built: &BuiltQuery) -> String {
        Self::assemble(&[
            format!("SELECT COUNT(*) FROM {}", quote_identifier(table)),
            built.where_clause.clone(),
        ])
    }

    /// Read for CSV export: every column, optionally windowed.
    pub fn select_all(table: &str, built: &BuiltQuery, window: Option<PageWindow>) -> String {
        Self::assemble(&[
            format!("SELECT * FROM {}", quote_identifier(table)),
            built.where_clause.clone(),
            built.order_by_clause.clone(),
            window.map(PageWindow::to_sql).unwrap_or_default(),
        ])
    }

    fn assemble(parts: &[String]) -> String {
        parts
            .iter()
            .filter(|part| !part.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("name"), "\"name\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("' OR '1'='1"), "' OR '1'='1");
    }

    #[test]
    fn test_build_binds_filter_values() {
        let filters: Filters = [("name", "' OR '1'='1"), ("city", ""), ("qty", "5%")]
            .into_iter()
            .collect();
        let built = QueryBuilder::build(&filters, &Sorters::new());

        assert_eq!(
            built.where_clause,
            r#"WHERE "name" LIKE ? ESCAPE '\' AND "qty" LIKE ? ESCAPE '\'"#
        );
        assert_eq!(
            built.params,
            vec![Value::from("%' OR '1'='1%"), Value::from("%5\\%%")]
        );
        assert!(built.order_by_clause.is_empty());
    }

    #[test]
    fn test_sort_order_parsing() {
        let sorters: Sorters =
            serde_json::from_str(r#"{"a": "DESC", "b": "asc", "c": "sideways"}"#).unwrap();
        let orders: Vec<_> = sorters.iter().collect();
        assert_eq!(
            orders,
            vec![
                ("a", SortOrder::Desc),
                ("b", SortOrder::Asc),
                ("c", SortOrder::Asc)
            ]
        );

        let built = QueryBuilder::build(&Filters::new(), &Sorters::single("price", SortOrder::Desc));
        assert_eq!(built.order_by_clause, "ORDER BY \"price\" DESC");
    }

    #[test]
    fn test_page_window_clamping() {
        assert_eq!(PageWindow::clamped(0, -5, 10_000), PageWindow { limit: 1, offset: 0 });
        assert_eq!(
            PageWindow::clamped(1_000_000, 20, 10_000),
            PageWindow { limit: 10_000, offset: 20 }
        );
        assert_eq!(PageWindow::clamped(50, 0, 25).limit, 25);
    }

    #[test]
    fn test_select_page_projects_primary_key() {
        let built = QueryBuilder::build(&Filters::new(), &Sorters::new());
        let window = PageWindow::clamped(5, 10, 10_000);

        assert_eq!(
            QueryBuilder::select_page("Orders", Some("id"), &built, window),
            "SELECT \"id\", * FROM \"Orders\" LIMIT 5 OFFSET 10"
        );
        assert_eq!(
            QueryBuilder::select_page("log", Some(ROWID_SENTINEL), &built, window),
            "SELECT _rowid_, * FROM \"log\" LIMIT 5 OFFSET 10"
        );
        assert_eq!(
            QueryBuilder::select_page("v", None, &built, window),
            "SELECT * FROM \"v\" LIMIT 5 OFFSET 10"
        );
    }

    #[test]
    fn test_count_ignores_order_and_window() {
        let filters: Filters = [("name", "a")].into_iter().collect();
        let built = QueryBuilder::build(&filters, &Sorters::single("name", SortOrder::Asc));
        assert_eq!(
            QueryBuilder::count("t", &built),
            r#"SELECT COUNT(*) FROM "t" WHERE "name" LIKE ? ESCAPE '\'"#
        );
    }

    #[test]
    fn test_select_all() {
        let built = QueryBuilder::build(&Filters::new(), &Sorters::single("id", SortOrder::Asc));
        assert_eq!(
            QueryBuilder::select_all("t", &built, None),
            "SELECT * FROM \"t\" ORDER BY \"id\" ASC"
        );
        assert_eq!(
            QueryBuilder::select_all("t", &built, Some(PageWindow::clamped(10, 0, 100))),
            "SELECT * FROM \"t\" ORDER BY \"id\" ASC LIMIT 10 OFFSET 0"
        );
    }

    #[test]
    fn test_filters_serialize_canonically() {
        let a: Filters = [("b", "2"), ("a", "1")].into_iter().collect();
        let b: Filters = [("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
