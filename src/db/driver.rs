//! Driver seam between the connection lifecycle and the database client.
//!
//! A [`Driver`] builds [`Engine`]s from a resolved URL. An engine owns a pool
//! and hands out [`Session`]s; dropping a session returns it to the pool.
//! Production code uses [`SqlxDriver`](crate::db::pool::SqlxDriver); tests
//! plug in scripted fakes to exercise retry and policy paths.

use crate::config::EngineOptions;
use crate::error::DbResult;
use std::future::Future;

/// Factory for engines.
pub trait Driver: Send + Sync + 'static {
    type Engine: Engine;

    /// Build an engine. Must not open a connection eagerly.
    ///
    /// `read_only` engines should open the database read-only where the
    /// backend supports it, on top of the per-session setting.
    fn create_engine(
        &self,
        url: &str,
        options: &EngineOptions,
        read_only: bool,
    ) -> DbResult<Self::Engine>;
}

/// A pooled handle to one database. Cloning shares the same pool.
pub trait Engine: Clone + Send + Sync + 'static {
    type Connection: Session;

    /// Check out a connection from the pool.
    fn connect(&self) -> impl Future<Output = DbResult<Self::Connection>> + Send;

    /// Close the pool and every idle connection in it.
    fn dispose(&self) -> impl Future<Output = DbResult<()>> + Send;
}

/// Per-connection policy hooks run right after checkout.
pub trait Session: Send + 'static {
    /// Store our crate version in a session variable where the backend has them.
    fn tag_version(&mut self, version: &str) -> impl Future<Output = DbResult<()>> + Send;

    /// Put the session into read-only mode. Failure must be reported, never ignored.
    fn enforce_read_only(&mut self) -> impl Future<Output = DbResult<()>> + Send;
}
