//! Error types for the DB Alchemy MCP server.
//!
//! `ConfigError` covers everything that can go wrong while reading the process
//! configuration and is fatal at startup. `DbError` covers per-request failures
//! and carries actionable suggestions for the calling agent.

use thiserror::Error;

/// Startup configuration failure. The binary reports it and exits with status 1.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Duplicate database name '{name}' (names are case-insensitive)")]
    DuplicateDatabase { name: String },

    #[error("No databases configured. Set DB_URL or one or more DB_<NAME>_URL variables")]
    NoDatabases,

    #[error("Invalid read-only flag '{value}' for database '{name}': expected true or false")]
    InvalidReadOnly { name: String, value: String },

    #[error("Invalid DB_ENGINE_OPTIONS: {message}")]
    InvalidEngineOptions { message: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Credential error: {message}")]
    Credential { message: String },

    #[error("Database '{name}' is currently unavailable")]
    Unavailable { name: String },

    #[error("Database '{name}' is not configured. {available}")]
    NotConfigured { name: String, available: String },

    #[error("Could not enforce read-only mode on database '{name}': {message}")]
    ReadOnlyEnforcement { name: String, message: String },

    #[error("Database '{name}' is read-only: {operation} is not allowed")]
    ReadOnlyViolation { name: String, operation: String },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential {
            message: message.into(),
        }
    }

    pub fn unavailable(name: impl Into<String>) -> Self {
        Self::Unavailable { name: name.into() }
    }

    /// `available` is the human-readable list of databases that do exist.
    pub fn not_configured(name: impl Into<String>, available: impl Into<String>) -> Self {
        Self::NotConfigured {
            name: name.into(),
            available: available.into(),
        }
    }

    pub fn read_only_enforcement(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReadOnlyEnforcement {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a schema error.
    pub fn read_only_violation(name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::ReadOnlyViolation {
            name: name.into(),
            operation: operation.into(),
        }
    }

    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::Credential { .. } => {
                Some("Sign in with 'az login' and check access to the database resource")
            }
            Self::Unavailable { .. } => Some("Retry the request shortly"),
            Self::NotConfigured { .. } => Some("Call list_databases to see configured names"),
            Self::ReadOnlyViolation { .. } => {
                Some("Send a single SELECT, SHOW, DESCRIBE or EXPLAIN statement")
            }
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Retry the request")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => DbError::schema(
                format!("Type not found: {}", type_name),
                type_name.to_string(),
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col.to_string())
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::connection(
                "Database worker crashed",
                "Retry the request; the connection will be re-established",
            ),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
/// Includes the suggestion field in the `data` object when available.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = suggestion_data(err.suggestion());
        match &err {
            DbError::InvalidInput { .. }
            | DbError::Schema { .. }
            | DbError::ReadOnlyViolation { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), data)
            }

            DbError::NotConfigured { .. } | DbError::Unavailable { .. } => {
                rmcp::ErrorData::resource_not_found(err.to_string(), data)
            }

            DbError::Database { message, sql_state, .. } => {
                let msg = match sql_state {
                    Some(code) => format!("{} (SQLSTATE: {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }

            DbError::Connection { .. }
            | DbError::Timeout { .. }
            | DbError::Credential { .. }
            | DbError::ReadOnlyEnforcement { .. }
            | DbError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}
