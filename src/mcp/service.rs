//! MCP service implementation using rmcp.
//!
//! This module defines the DbService struct with all database tools
//! exposed via the MCP protocol using the rmcp framework's macros.
//! Every tool except `list_databases` takes the target database by name.

use crate::config::{Config, DEFAULT_MAX_CHARS, DEFAULT_MAX_ROWS};
use crate::db::{DatabaseManager, QueryExecutor};
use crate::models::DatabaseSummary;
use crate::tools::databases::{DatabaseInfoInput, DatabaseToolHandler, ListDatabasesOutput};
use crate::tools::query::{ExecuteQueryInput, QueryToolHandler};
use crate::tools::schema::{
    AllTableNamesInput, FilterTableNamesInput, SchemaDefinitionsInput, SchemaToolHandler,
};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

/// Limits applied to execute_query output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSettings {
    /// Rows kept from one result
    pub max_rows: usize,
    /// Character budget of the vertical format
    pub max_chars: usize,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

impl From<&Config> for ToolSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_rows: config.max_rows,
            max_chars: config.max_chars,
        }
    }
}

#[derive(Clone)]
pub struct DbService {
    /// Shared registry of configured databases
    manager: Arc<DatabaseManager>,
    settings: ToolSettings,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl DbService {
    pub fn new(manager: Arc<DatabaseManager>, settings: ToolSettings) -> Self {
        Self {
            manager,
            settings,
            tool_router: Self::tool_router(),
        }
    }

    /// Trimmed database name, or an error pointing at list_databases.
    fn validate_database(&self, provided: &str) -> Result<String, McpError> {
        let trimmed = provided.trim();
        if trimmed.is_empty() {
            Err(McpError::invalid_params(
                "database is required. Call list_databases first to get available names.",
                None,
            ))
        } else {
            Ok(trimmed.to_string())
        }
    }

    fn instructions(&self) -> String {
        let labels: Vec<String> = self
            .manager
            .summaries()
            .iter()
            .map(DatabaseSummary::label)
            .collect();
        format!(
            "SQL database tools. Every tool except `list_databases` takes a `database` name \
             (case-insensitive).\n\
             \n\
             ## Workflow\n\
             1. Call `list_databases` to see which databases are available right now\n\
             2. Use `all_table_names` / `filter_table_names` to find tables\n\
             3. Use `schema_definitions` to read columns and relationships\n\
             4. Use `execute_query` with `:name` placeholders and the `params` object\n\
             \n\
             Databases marked [read-only] accept one SELECT, SHOW or EXPLAIN statement per call.\n\
             \n\
             Configured databases: {}",
            labels.join(", ")
        )
    }
}

#[tool_router]
impl DbService {
    #[tool(
        description = "List the databases that are currently available.\nReturns names, descriptions, and read-only status."
    )]
    async fn list_databases(&self) -> Json<ListDatabasesOutput> {
        let handler = DatabaseToolHandler::new(self.manager.clone());
        Json(handler.list_databases().await)
    }

    #[tool(description = "Return all table names in the database separated by comma.")]
    async fn all_table_names(
        &self,
        Parameters(input): Parameters<AllTableNamesInput>,
    ) -> Result<String, McpError> {
        let mut input = input;
        input.database = self.validate_database(&input.database)?;
        let handler = SchemaToolHandler::new(self.manager.clone());
        handler.all_table_names(input).await.map_err(McpError::from)
    }

    #[tool(
        description = "Return all table names in the database containing the substring 'q' separated by comma."
    )]
    async fn filter_table_names(
        &self,
        Parameters(input): Parameters<FilterTableNamesInput>,
    ) -> Result<String, McpError> {
        let mut input = input;
        input.database = self.validate_database(&input.database)?;
        let handler = SchemaToolHandler::new(self.manager.clone());
        handler
            .filter_table_names(input)
            .await
            .map_err(McpError::from)
    }

    #[tool(description = "Returns schema and relation information for the given tables.")]
    async fn schema_definitions(
        &self,
        Parameters(input): Parameters<SchemaDefinitionsInput>,
    ) -> Result<String, McpError> {
        let mut input = input;
        input.database = self.validate_database(&input.database)?;
        let handler = SchemaToolHandler::new(self.manager.clone());
        handler
            .schema_definitions(input)
            .await
            .map_err(McpError::from)
    }

    #[tool(
        description = "Execute a SQL query and return results in a readable format.\nVertical output (default) is truncated after EXECUTE_QUERY_MAX_CHARS characters; table, markdown and json formats are also available.\nIMPORTANT: You MUST use the params parameter for value substitution (e.g. 'WHERE id = :id' with params={\"id\": 123}) to prevent SQL injection. Direct string concatenation is a serious security risk."
    )]
    async fn execute_query(&self, Parameters(input): Parameters<ExecuteQueryInput>) -> String {
        let handler = QueryToolHandler::with_limits(
            self.manager.clone(),
            QueryExecutor::new(self.settings.max_rows),
            self.settings.max_chars,
        );
        handler.execute_query(input).await
    }

    #[tool(
        description = "Describe the server behind a database: backend, version, database name, host and user."
    )]
    async fn database_info(
        &self,
        Parameters(input): Parameters<DatabaseInfoInput>,
    ) -> Result<String, McpError> {
        let mut input = input;
        input.database = self.validate_database(&input.database)?;
        let handler = DatabaseToolHandler::new(self.manager.clone());
        handler.database_info(input).await.map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for DbService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "db-alchemy-mcp".to_owned(),
                title: Some("DB Alchemy MCP".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(self.instructions()),
        }
    }
}
