//! Database layer.
//!
//! - `driver`: the engine/session seam
//! - `pool`: sqlx engines and pooled connections
//! - `database`: one named database and its engine lifecycle
//! - `manager`: the registry of configured databases
//! - `executor`, `params`, `types`: statement execution and value decoding
//! - `guard`: statement check for read-only databases
//! - `schema`: table introspection

pub mod database;
pub mod driver;
pub mod executor;
pub mod guard;
pub mod manager;
pub mod params;
pub mod pool;
pub mod schema;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use database::{ConnectContext, DatabaseConfig, FatalHook, exit_process_hook};
pub use driver::{Driver, Engine, Session};
pub use executor::QueryExecutor;
pub use manager::DatabaseManager;
pub use pool::{DbConnection, DbPool, SqlxDriver};
pub use schema::SchemaInspector;
