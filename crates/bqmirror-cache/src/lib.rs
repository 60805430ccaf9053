//! Durable local mirror of warehouse metadata
//!
//! A SQLite file that outlives the process and holds the last known
//! project → dataset → table → column hierarchy. Each scope (the project
//! list, the datasets of one project, the tables of one dataset) is replaced
//! atomically and independently of every other scope.

pub mod query;
pub mod store;

pub use query::{CacheQuery, QueryResult};
pub use store::{CacheError, CacheResult, CacheStore, CACHE_SCHEMA_VERSION};
