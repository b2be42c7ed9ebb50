pub mod database;
pub mod session;

pub use database::{EngineFactory, EngineSource, ResultSet, Value};
pub use session::{Request, Response, SessionHandle, SessionWorker};
