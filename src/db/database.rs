//! One named database and the lifecycle of its engine.
//!
//! A [`DatabaseConfig`] owns at most one engine, created lazily on the first
//! connection attempt. Connecting follows a fixed sequence:
//!
//! 1. fail fast with [`DbError::Unavailable`] if the database is marked unavailable
//! 2. get or create the engine, check out a connection, tag the session
//! 3. on failure: dispose the engine, then make exactly one more attempt
//! 4. for read-only databases, enforce read-only mode on the session; failure
//!    here is fatal and the connection is never handed out
//!
//! The returned connection goes back to the pool when dropped, including when
//! the future holding it is cancelled.

use crate::auth::{TOKEN_PLACEHOLDER, TokenCache};
use crate::config::{DatabaseEntry, EngineOptions};
use crate::db::driver::{Driver, Engine, Session};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseSummary, DatabaseType};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Version written into each session where the backend supports it.
pub const SESSION_TAG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Called when read-only mode cannot be enforced.
pub type FatalHook = Arc<dyn Fn(&DbError) + Send + Sync>;

/// Default fatal hook: log and terminate the process.
///
/// Serving a database declared read-only without the guarantee in place is
/// not an acceptable degraded mode.
pub fn exit_process_hook() -> FatalHook {
    Arc::new(|err: &DbError| {
        error!(error = %err, "Read-only enforcement failed, shutting down");
        std::process::exit(1);
    })
}

/// Collaborators shared by every database in a manager.
pub struct ConnectContext<D: Driver> {
    pub driver: Arc<D>,
    pub engine_options: EngineOptions,
    pub tokens: Arc<TokenCache>,
    pub on_fatal: FatalHook,
}

impl<D: Driver> ConnectContext<D> {
    pub fn new(driver: D, engine_options: EngineOptions, tokens: Arc<TokenCache>) -> Self {
        Self {
            driver: Arc::new(driver),
            engine_options,
            tokens,
            on_fatal: exit_process_hook(),
        }
    }

    /// Replace the fatal hook.
    pub fn with_fatal_hook(mut self, hook: FatalHook) -> Self {
        self.on_fatal = hook;
        self
    }
}

impl<D: Driver> Clone for ConnectContext<D> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            engine_options: self.engine_options.clone(),
            tokens: Arc::clone(&self.tokens),
            on_fatal: Arc::clone(&self.on_fatal),
        }
    }
}

/// Availability and engine share one lock so no reader ever sees a
/// half-replaced engine.
struct EngineSlot<E> {
    available: bool,
    engine: Option<E>,
}

pub type ConnectionOf<D> = <<D as Driver>::Engine as Engine>::Connection;

pub struct DatabaseConfig<D: Driver> {
    name: String,
    url: String,
    description: String,
    read_only: bool,
    ctx: ConnectContext<D>,
    slot: Mutex<EngineSlot<D::Engine>>,
}

impl<D: Driver> DatabaseConfig<D> {
    pub fn new(entry: DatabaseEntry, ctx: ConnectContext<D>) -> Self {
        Self {
            name: entry.name.to_lowercase(),
            url: entry.url,
            description: entry.description,
            read_only: entry.read_only,
            ctx,
            slot: Mutex::new(EngineSlot {
                available: true,
                engine: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Unresolved URL. May still contain the token placeholder.
    pub fn raw_url(&self) -> &str {
        &self.url
    }

    /// Backend named by the URL scheme.
    pub fn db_type(&self) -> Option<DatabaseType> {
        DatabaseType::from_connection_string(&self.url)
    }

    pub fn summary(&self) -> DatabaseSummary {
        DatabaseSummary {
            name: self.name.clone(),
            description: self.description.clone(),
            read_only: self.read_only,
        }
    }

    pub async fn is_available(&self) -> bool {
        self.slot.lock().await.available
    }

    pub async fn has_engine(&self) -> bool {
        self.slot.lock().await.engine.is_some()
    }

    /// URL with the token placeholder replaced by a live token.
    pub async fn resolve_url(&self) -> DbResult<String> {
        if !self.url.contains(TOKEN_PLACEHOLDER) {
            return Ok(self.url.clone());
        }
        let token = self.ctx.tokens.get_token().await?;
        Ok(self.url.replace(TOKEN_PLACEHOLDER, &token))
    }

    /// Return the engine, creating it on first use.
    pub async fn get_engine(&self) -> DbResult<D::Engine> {
        let mut slot = self.slot.lock().await;
        if !slot.available {
            return Err(DbError::unavailable(&self.name));
        }
        if let Some(engine) = &slot.engine {
            return Ok(engine.clone());
        }

        let url = self.resolve_url().await?;
        let engine = self
            .ctx
            .driver
            .create_engine(&url, &self.ctx.engine_options, self.read_only)?;
        info!(database = %self.name, "Engine created");

        slot.engine = Some(engine.clone());
        Ok(engine)
    }

    /// Mark the database unavailable and drop its engine.
    pub async fn mark_unavailable(&self) {
        let engine = {
            let mut slot = self.slot.lock().await;
            slot.available = false;
            slot.engine.take()
        };

        if let Some(engine) = engine {
            discard_outcome(&self.name, "engine disposal", engine.dispose().await);
        }
        debug!(database = %self.name, "Marked unavailable");
    }

    pub async fn mark_available(&self) {
        self.slot.lock().await.available = true;
    }

    /// Check out a policy-enforced connection, retrying once on failure.
    pub async fn connect(&self) -> DbResult<ConnectionOf<D>> {
        if !self.is_available().await {
            return Err(DbError::unavailable(&self.name));
        }

        let mut conn = match self.open_session().await {
            Ok(conn) => conn,
            Err(first) => {
                warn!(
                    database = %self.name,
                    error = %first,
                    "First connection attempt failed, retrying with a fresh engine"
                );
                self.mark_unavailable().await;
                self.mark_available().await;

                self.open_session().await.inspect_err(|e| {
                    error!(
                        database = %self.name,
                        error = %e,
                        "Failed to get database connection after retry"
                    );
                })?
            }
        };

        if self.read_only {
            if let Err(e) = conn.enforce_read_only().await {
                let err = DbError::read_only_enforcement(&self.name, e.to_string());
                (self.ctx.on_fatal)(&err);
                return Err(err);
            }
        }

        Ok(conn)
    }

    /// Dispose the engine without changing availability.
    pub async fn close(&self) {
        let engine = self.slot.lock().await.engine.take();
        if let Some(engine) = engine {
            discard_outcome(&self.name, "engine disposal", engine.dispose().await);
        }
    }

    async fn open_session(&self) -> DbResult<ConnectionOf<D>> {
        let engine = self.get_engine().await?;
        let mut conn = engine.connect().await?;
        discard_outcome(
            &self.name,
            "session tag",
            conn.tag_version(SESSION_TAG_VERSION).await,
        );
        Ok(conn)
    }
}

impl<D: Driver> std::fmt::Debug for DatabaseConfig<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // URL intentionally omitted: it may hold credentials
        f.debug_struct("DatabaseConfig")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

/// Record the outcome of a best-effort step and move on.
fn discard_outcome(database: &str, step: &'static str, outcome: DbResult<()>) {
    if let Err(e) = outcome {
        debug!(database, step, error = %e, "Best-effort step failed, ignoring");
    }
}
