//! Query execution tool.
//!
//! This module implements the `execute_query` MCP tool. One statement runs
//! per call on a connection checked out from the named database. Statements
//! for read-only databases pass the statement guard before a connection is
//! checked out, and the session itself is read-only as well.

use crate::config::DEFAULT_MAX_CHARS;
use crate::db::guard::check_read_only;
use crate::db::params::rewrite_named_params;
use crate::db::{DatabaseManager, QueryExecutor};
use crate::error::{DbError, DbResult};
use crate::tools::format::{OutputFormat, format_outcome};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Input for the execute_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteQueryInput {
    /// Database name from list_databases (case-insensitive)
    pub database: String,
    /// SQL statement. Use :name placeholders for values, e.g. "WHERE id = :id"
    pub query: String,
    /// Values for the :name placeholders, e.g. {"id": 123}
    #[serde(default)]
    pub params: Option<HashMap<String, JsonValue>>,
    /// Output format: "vertical" (default), "table", "markdown" or "json"
    #[serde(default)]
    pub format: OutputFormat,
}

/// Handler for query execution.
pub struct QueryToolHandler {
    manager: Arc<DatabaseManager>,
    executor: QueryExecutor,
    max_chars: usize,
}

impl QueryToolHandler {
    pub fn new(manager: Arc<DatabaseManager>) -> Self {
        Self::with_limits(manager, QueryExecutor::default(), DEFAULT_MAX_CHARS)
    }

    /// Use a custom row cap and vertical-output character budget.
    pub fn with_limits(
        manager: Arc<DatabaseManager>,
        executor: QueryExecutor,
        max_chars: usize,
    ) -> Self {
        Self {
            manager,
            executor,
            max_chars,
        }
    }

    /// Run the statement and render its outcome. Failures come back as
    /// `Error: ...` text rather than a protocol error.
    pub async fn execute_query(&self, input: ExecuteQueryInput) -> String {
        let database = input.database.clone();
        match self.run(input).await {
            Ok(text) => text,
            Err(e) => {
                warn!(database = %database, error = %e, "Query failed");
                format!("Error: {}", e)
            }
        }
    }

    async fn run(&self, input: ExecuteQueryInput) -> DbResult<String> {
        let params = input.params.unwrap_or_default();
        info!(
            database = %input.database,
            params = params.len(),
            format = ?input.format,
            "Executing query"
        );

        let config = self.manager.get(&input.database)?;
        if config.read_only() {
            let db_type = config.db_type().ok_or_else(|| {
                DbError::connection(
                    "Unsupported connection URL scheme",
                    "Use a postgres://, mysql:// or sqlite: URL",
                )
            })?;
            let prepared = rewrite_named_params(&input.query, db_type)?;
            check_read_only(config.name(), &prepared.sql, db_type)?;
        }

        let mut conn = config.connect().await?;
        let outcome = self
            .executor
            .execute(&mut conn, &input.query, &params)
            .await?;
        Ok(format_outcome(&outcome, input.format, self.max_chars))
    }
}
