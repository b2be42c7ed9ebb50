//! Request and response messages.
//!
//! Both are adjacently tagged unions. On the wire a message is
//! `{"action": "<name>", "payload": {...}}` with camelCase field names.
//!
//! # Example
//!
//! ```ignore
//! let request = Request::from_json(r#"{
//!     "action": "getTableData",
//!     "payload": {"currentTable": "Orders", "limit": 5, "offset": 0}
//! }"#)?;
//! ```

use serde::{Deserialize, Deserializer, Serialize};

use super::export::ExportSpec;
use super::query_builder::{Filters, PageWindow, Sorters};
use crate::errors::SessionError;
use crate::services::database::traits::{
    CatalogSnapshot, IndexDescriptor, ResultSet, TableDescriptor, Value,
};

/// Every action tag a request may carry.
pub const REQUEST_ACTIONS: &[&str] = &[
    "init",
    "openFile",
    "getTableData",
    "refresh",
    "exec",
    "execBatch",
    "download",
    "update",
    "delete",
    "insert",
    "export",
];

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Which page of which table to read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// Table or view; the first catalog entry when absent
    #[serde(default, alias = "table")]
    pub current_table: Option<String>,
    pub limit: i64,
    pub offset: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: Filters,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sorters: Sorters,
}

impl PageRequest {
    pub fn new(table: impl Into<String>, limit: i64, offset: i64) -> Self {
        Self {
            current_table: Some(table.into()),
            limit,
            offset,
            ..Default::default()
        }
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_sorters(mut self, sorters: Sorters) -> Self {
        self.sorters = sorters;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecRequest {
    pub query: String,
    /// Page to re-read when the script turns out to be a plain write
    #[serde(flatten)]
    pub page: PageRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecBatchRequest {
    pub queries: Vec<String>,
    #[serde(flatten)]
    pub page: PageRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Value>,
    pub primary_value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub table: String,
    pub primary_value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertRequest {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportType {
    Table,
    Current,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: Filters,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sorters: Sorters,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    pub export_type: ExportType,
    #[serde(default)]
    pub custom_query: Option<String>,
}

impl ExportRequest {
    /// Resolve into an export spec, checking that the fields the export
    /// type needs are present.
    pub fn into_spec(self, max_page_size: i64) -> Result<ExportSpec, SessionError> {
        let missing = |field: &str| {
            SessionError::InvalidRequest(format!(
                "{} export requires `{}`",
                match self.export_type {
                    ExportType::Table => "table",
                    ExportType::Current => "current",
                    ExportType::Custom => "custom",
                },
                field
            ))
        };

        match self.export_type {
            ExportType::Table => {
                let table = self.table.clone().ok_or_else(|| missing("table"))?;
                Ok(ExportSpec::Table { table })
            }
            ExportType::Current => {
                let table = self.table.clone().ok_or_else(|| missing("table"))?;
                let window = self.limit.map(|limit| {
                    PageWindow::clamped(limit, self.offset.unwrap_or(0), max_page_size)
                });
                Ok(ExportSpec::Current {
                    table,
                    window,
                    filters: self.filters.clone(),
                    sorters: self.sorters.clone(),
                })
            }
            ExportType::Custom => {
                let query = self
                    .custom_query
                    .clone()
                    .ok_or_else(|| missing("customQuery"))?;
                Ok(ExportSpec::Custom { query })
            }
        }
    }
}

/// A request to the session worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "action",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Request {
    /// Start over with the demo dataset
    Init,
    OpenFile {
        file: Vec<u8>,
    },
    GetTableData(PageRequest),
    /// Same as `GetTableData`; sent after the host knows data changed
    Refresh(PageRequest),
    Exec(ExecRequest),
    ExecBatch(ExecBatchRequest),
    Download,
    Update(UpdateRequest),
    Delete(DeleteRequest),
    Insert(InsertRequest),
    Export(ExportRequest),
}

impl Request {
    /// Parse a JSON request.
    ///
    /// An unknown action tag is reported as `UnknownAction` and logged;
    /// a known tag with a bad payload is `InvalidRequest`.
    pub fn from_json(text: &str) -> Result<Self, SessionError> {
        let raw: serde_json::Value =
            serde_json::from_str(text).map_err(|e| SessionError::InvalidRequest(e.to_string()))?;

        let action = raw
            .get("action")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        if !REQUEST_ACTIONS.contains(&action) {
            tracing::warn!(action, "Unknown session action");
            return Err(SessionError::UnknownAction(action.to_string()));
        }

        serde_json::from_value(raw).map_err(|e| SessionError::InvalidRequest(e.to_string()))
    }

    pub fn action(&self) -> &'static str {
        match self {
            Request::Init => "init",
            Request::OpenFile { .. } => "openFile",
            Request::GetTableData(_) => "getTableData",
            Request::Refresh(_) => "refresh",
            Request::Exec(_) => "exec",
            Request::ExecBatch(_) => "execBatch",
            Request::Download => "download",
            Request::Update(_) => "update",
            Request::Delete(_) => "delete",
            Request::Insert(_) => "insert",
            Request::Export(_) => "export",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    pub is_custom_query_error: bool,
}

impl From<&SessionError> for ErrorPayload {
    fn from(error: &SessionError) -> Self {
        Self {
            message: error.to_string(),
            is_custom_query_error: error.is_custom_query_error(),
        }
    }
}

/// A response from the session worker. Every request gets exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "action",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Response {
    InitComplete {
        table_schema: Vec<TableDescriptor>,
        index_schema: Vec<IndexDescriptor>,
        current_table: Option<String>,
    },
    /// One page; when the table has a primary key it is column 0
    QueryComplete {
        results: ResultSet,
        max_size: u64,
    },
    CustomQueryComplete {
        results: Vec<ResultSet>,
    },
    /// The schema changed; the host should reload its table list
    UpdateInstance {
        table_schema: Vec<TableDescriptor>,
        index_schema: Vec<IndexDescriptor>,
    },
    UpdateComplete {
        #[serde(rename = "type")]
        kind: UpdateKind,
    },
    InsertComplete,
    DownloadComplete {
        bytes: Vec<u8>,
    },
    ExportComplete {
        results: String,
    },
    QueryError {
        error: ErrorPayload,
    },
}

impl Response {
    pub fn init_complete(catalog: &CatalogSnapshot) -> Self {
        Response::InitComplete {
            table_schema: catalog.tables.clone(),
            index_schema: catalog.indexes.clone(),
            current_table: catalog.first_table.clone(),
        }
    }

    pub fn update_instance(catalog: &CatalogSnapshot) -> Self {
        Response::UpdateInstance {
            table_schema: catalog.tables.clone(),
            index_schema: catalog.indexes.clone(),
        }
    }

    pub fn error(error: &SessionError) -> Self {
        Response::QueryError {
            error: error.into(),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Response::InitComplete { .. } => "initComplete",
            Response::QueryComplete { .. } => "queryComplete",
            Response::CustomQueryComplete { .. } => "customQueryComplete",
            Response::UpdateInstance { .. } => "updateInstance",
            Response::UpdateComplete { .. } => "updateComplete",
            Response::InsertComplete => "insertComplete",
            Response::DownloadComplete { .. } => "downloadComplete",
            Response::ExportComplete { .. } => "exportComplete",
            Response::QueryError { .. } => "queryError",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::QueryError { .. })
    }
}
