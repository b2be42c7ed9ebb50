//! Embedded engine layer.
//!
//! - `traits`: the engine contract the session layer consumes
//! - `drivers`: concrete engines and the factory that builds them

pub mod drivers;
pub mod traits;

pub use drivers::{EngineFactory, EngineSource};
pub use traits::{BoxedEngine, CatalogSnapshot, ResultSet, SqlEngine, Value};
