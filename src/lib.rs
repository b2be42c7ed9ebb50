//! liteview: the query/session core of an in-browser style SQLite viewer.
//!
//! A session owns one embedded SQLite database and answers page reads,
//! ad-hoc scripts, row mutations, CSV exports and downloads. Hosts talk to it
//! through [`SessionHandle`], which forwards [`Request`]s to a dedicated
//! worker thread and returns one [`Response`] for each.

pub mod config;
pub mod errors;
pub mod services;

pub use config::SessionConfig;
pub use errors::{Result, SessionError};
pub use services::{Request, Response, SessionHandle, SessionWorker};
