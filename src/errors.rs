//! Session error taxonomy.
//!
//! Every failure a session request can hit maps onto one of these variants.
//! At the worker boundary they all collapse into a single `queryError`
//! response; `is_custom_query_error` decides whether the host shows the
//! message next to the SQL editor or as a notification.

use thiserror::Error;

use crate::services::session::mutation::MutationKind;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The engine could not be constructed (corrupt bytes, I/O failure).
    #[error("Failed to initialize database: {0}")]
    Initialization(String),

    /// The opened file contains no tables or views.
    #[error("Database is empty")]
    EmptyDatabase,

    /// A request other than init/openFile arrived before any engine existed.
    #[error("Database is not initialized")]
    NotInitialized,

    /// A user-submitted statement failed.
    #[error("{0}")]
    CustomQuery(String),

    #[error("Table \"{0}\" has no primary key")]
    NoPrimaryKey(String),

    #[error("Table \"{0}\" not found")]
    UnknownTable(String),

    #[error("No valid values provided for insertion into \"{0}\"")]
    EmptyInsert(String),

    #[error("Got {values} values for {columns} columns")]
    ValueCountMismatch { columns: usize, values: usize },

    /// The engine rejected an insert, update or delete.
    #[error("Error while {operation} table {table}: {message}")]
    Mutation {
        operation: MutationKind,
        table: String,
        message: String,
    },

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// A request whose payload does not fit its action.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Session worker is not running")]
    WorkerClosed,

    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}

impl SessionError {
    /// Whether the error belongs inline next to the SQL editor.
    pub fn is_custom_query_error(&self) -> bool {
        matches!(self, SessionError::CustomQuery(_))
    }

    /// Whether the session can no longer serve reads after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Initialization(_) | SessionError::EmptyDatabase
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
