//! Query/session layer.
//!
//! - `catalog`: schema snapshot rebuilt from the engine
//! - `query_builder`: page, count and export reads from filters and sorters
//! - `cache`: TTL + LRU result cache
//! - `mutation`: row insert, update and delete
//! - `statement`: splitting and classifying user scripts
//! - `core`: the `Session` tying the above to one engine
//! - `worker`: the thread that serves a session over channels

pub mod cache;
pub mod catalog;
pub mod core;
pub mod demo;
pub mod export;
pub mod messages;
pub mod mutation;
pub mod query_builder;
pub mod statement;
pub mod worker;

pub use cache::{CacheKey, CacheStats, ResultCache};
pub use catalog::SchemaCatalog;
pub use self::core::{ExecOutcome, Session, SessionState, TablePage};
pub use export::ExportSpec;
pub use messages::{PageRequest, Request, Response};
pub use mutation::{MutationEngine, MutationKind};
pub use query_builder::{Filters, PageWindow, QueryBuilder, SortOrder, Sorters};
pub use worker::{SessionHandle, SessionWorker};
