//! CSV export.
//!
//! Every field is wrapped in double quotes and rows are separated by `\n`,
//! with no trailing newline. Embedded double quotes are doubled, so the
//! output is valid RFC 4180.

use csv::{QuoteStyle, Terminator, WriterBuilder};

use super::query_builder::{Filters, PageWindow, Sorters};
use crate::errors::{Result, SessionError};
use crate::services::database::traits::{ResultSet, Value};

/// What to export.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportSpec {
    /// Every row of a table, unfiltered
    Table { table: String },
    /// What the host currently shows: filters, sorters and page window
    Current {
        table: String,
        window: Option<PageWindow>,
        filters: Filters,
        sorters: Sorters,
    },
    /// The first result set of an arbitrary query
    Custom { query: String },
}

impl ExportSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ExportSpec::Table { .. } => "table",
            ExportSpec::Current { .. } => "current",
            ExportSpec::Custom { .. } => "custom",
        }
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        other => other.to_display_string(),
    }
}

/// Render a result set as CSV.
///
/// A set without columns renders as the empty string.
pub fn to_csv(set: &ResultSet) -> Result<String> {
    if set.columns.is_empty() {
        return Ok(String::new());
    }

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(&set.columns)?;
    for row in &set.rows {
        writer.write_record(row.iter().map(cell))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| SessionError::Csv(e.into_error().into()))?;
    let mut text =
        String::from_utf8(bytes).map_err(|e| SessionError::Engine(anyhow::Error::new(e)))?;

    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}
