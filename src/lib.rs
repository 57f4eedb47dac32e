//! Shared service plumbing: a pooled MySQL connection with schema helpers,
//! an Elasticsearch client with multi-search batching, a structured JSON
//! logger and typed environment lookups.

pub mod db;
pub mod env;
pub mod error;
pub mod logger;
pub mod search;

pub use db::{DatabaseConfig, MySqlConnectionPool, TableModel};
pub use error::{CommonError, Result};
pub use logger::{Logger, LoggerConfig};
pub use search::{MultiSearchQuery, QueryBody, SearchClient, SearchConfig, SearchQuery};
