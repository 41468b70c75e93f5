//! Access-token handling for token-authenticated databases.
//!
//! Connection URLs may embed the `AZURE_TOKEN` placeholder in place of a
//! password. Before an engine is built the placeholder is replaced with a
//! short-lived identity token obtained from a [`TokenProvider`] and cached in a
//! [`TokenCache`] shared by every database.

use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Literal marker inside a connection URL that is substituted with a live token.
pub const TOKEN_PLACEHOLDER: &str = "AZURE_TOKEN";

/// Resource identifier for Azure Database for PostgreSQL/MySQL.
pub const DEFAULT_TOKEN_RESOURCE: &str = "https://ossrdbms-aad.database.windows.net";

/// A cached token is refreshed once its remaining lifetime drops below this.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Lifetime assigned to a freshly fetched token, regardless of what the
/// provider reports. Keeps us ahead of the usual one-hour token lifetime.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(55 * 60);

/// A token as reported by the credential provider.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Source of identity tokens.
///
/// Returns a boxed future so the cache can hold the provider as a trait object.
pub trait TokenProvider: Send + Sync {
    fn fetch_token<'a>(&'a self, resource: &'a str) -> BoxFuture<'a, DbResult<AccessToken>>;
}

// =============================================================================
// Azure CLI Provider
// =============================================================================

/// Fetches tokens through `az account get-access-token`.
#[derive(Debug, Clone)]
pub struct AzureCliProvider {
    program: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    #[serde(rename = "expires_on", default)]
    expires_on: Option<i64>,
}

impl AzureCliProvider {
    pub fn new() -> Self {
        Self {
            program: "az".to_string(),
        }
    }

    /// Use a different executable, e.g. a wrapper script.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, resource: &str) -> DbResult<AccessToken> {
        let output = tokio::process::Command::new(&self.program)
            .args([
                "account",
                "get-access-token",
                "--resource",
                resource,
                "--output",
                "json",
            ])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DbError::credential(format!("Failed to run '{}': {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DbError::credential(format!(
                "'{} account get-access-token' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        parse_cli_output(&output.stdout)
    }
}

impl Default for AzureCliProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenProvider for AzureCliProvider {
    fn fetch_token<'a>(&'a self, resource: &'a str) -> BoxFuture<'a, DbResult<AccessToken>> {
        Box::pin(self.run(resource))
    }
}

fn parse_cli_output(stdout: &[u8]) -> DbResult<AccessToken> {
    let response: CliTokenResponse = serde_json::from_slice(stdout)
        .map_err(|e| DbError::credential(format!("Unexpected Azure CLI output: {}", e)))?;
    if response.access_token.is_empty() {
        return Err(DbError::credential("Azure CLI returned an empty access token"));
    }
    Ok(AccessToken {
        token: response.access_token,
        expires_at: response
            .expires_on
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
    })
}

// =============================================================================
// Token Cache
// =============================================================================

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.saturating_duration_since(now) >= REFRESH_MARGIN
    }
}

/// Process-wide token cache.
///
/// The freshness check and the provider call happen under one async mutex, so
/// concurrent callers trigger at most one fetch per staleness window. Fetch
/// failures are returned to the caller without retrying.
pub struct TokenCache {
    provider: Arc<dyn TokenProvider>,
    resource: String,
    state: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn TokenProvider>, resource: impl Into<String>) -> Self {
        Self {
            provider,
            resource: resource.into(),
            state: Mutex::new(None),
        }
    }

    /// Cache backed by the Azure CLI for the default database resource.
    pub fn azure_cli() -> Self {
        Self::new(Arc::new(AzureCliProvider::new()), DEFAULT_TOKEN_RESOURCE)
    }

    /// Return a token with at least [`REFRESH_MARGIN`] of remaining lifetime,
    /// fetching a new one if needed.
    pub async fn get_token(&self) -> DbResult<String> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        if let Some(cached) = state.as_ref().filter(|c| c.is_fresh(now)) {
            return Ok(cached.value.clone());
        }

        debug!(resource = %self.resource, "Refreshing access token");
        let fresh = self.provider.fetch_token(&self.resource).await?;
        info!(
            resource = %self.resource,
            provider_expiry = ?fresh.expires_at,
            "Obtained new access token"
        );

        let value = fresh.token.clone();
        *state = Some(CachedToken {
            value: fresh.token,
            expires_at: now + FRESHNESS_WINDOW,
        });
        Ok(value)
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}
