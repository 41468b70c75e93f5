//! DB Alchemy MCP Library
//!
//! MCP (Model Context Protocol) tools that let AI assistants inspect and
//! query named SQL databases (SQLite, PostgreSQL, MySQL). Each database keeps
//! a lazily created engine that is rebuilt once on connection failure, can
//! be forced read-only, and may authenticate with a cached cloud token.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use db::DatabaseManager;
pub use error::{ConfigError, DbError};
pub use mcp::DbService;
