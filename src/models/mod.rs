//! Data models for the DB Alchemy MCP server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{DatabaseSummary, DatabaseType};
pub use query::{
    DEFAULT_MAX_ROWS, NULL_MARKER, QueryParam, QueryResult, RowCollector, StatementOutcome,
    render_value,
};
pub use schema::{ColumnDefinition, ForeignKey, TableSchema};
