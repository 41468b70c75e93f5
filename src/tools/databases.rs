//! Database discovery tools: `list_databases` and `database_info`.

use crate::db::DatabaseManager;
use crate::error::DbResult;
use crate::models::DatabaseSummary;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Output for the list_databases tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListDatabasesOutput {
    /// Databases currently accepting requests, sorted by name
    pub databases: Vec<DatabaseSummary>,
    pub count: usize,
    /// Same list as one line of text
    pub summary: String,
}

/// Input for the database_info tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DatabaseInfoInput {
    /// Database name from list_databases (case-insensitive)
    pub database: String,
}

pub struct DatabaseToolHandler {
    manager: Arc<DatabaseManager>,
}

impl DatabaseToolHandler {
    pub fn new(manager: Arc<DatabaseManager>) -> Self {
        Self { manager }
    }

    pub async fn list_databases(&self) -> ListDatabasesOutput {
        let databases = self.manager.list_available().await;
        let summary = self.manager.available_databases_text().await;
        ListDatabasesOutput {
            count: databases.len(),
            databases,
            summary,
        }
    }

    /// Backend, server version, database, host and user of one database.
    pub async fn database_info(&self, input: DatabaseInfoInput) -> DbResult<String> {
        self.manager.db_info(&input.database).await
    }
}
