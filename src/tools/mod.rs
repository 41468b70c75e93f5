//! MCP tool implementations.
//!
//! - `databases`: list configured databases and describe their servers
//! - `schema`: table names and table definitions
//! - `query`: execute one statement with named parameters
//! - `format`: text and JSON rendering of statement results

pub mod databases;
pub mod format;
pub mod query;
pub mod schema;

pub use databases::{DatabaseInfoInput, DatabaseToolHandler, ListDatabasesOutput};
pub use format::OutputFormat;
pub use query::{ExecuteQueryInput, QueryToolHandler};
pub use schema::{
    AllTableNamesInput, FilterTableNamesInput, SchemaDefinitionsInput, SchemaToolHandler,
};
