//! Scripted in-memory driver for lifecycle tests.

use crate::auth::{AccessToken, TokenCache, TokenProvider};
use crate::config::EngineOptions;
use crate::db::database::FatalHook;
use crate::db::driver::{Driver, Engine, Session};
use crate::error::{DbError, DbResult};
use futures_util::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct FakeState {
    engines_created: AtomicUsize,
    connect_calls: AtomicUsize,
    disposals: AtomicUsize,
    open: AtomicUsize,
    /// true = succeed, false = fail; empty means succeed
    connect_script: Mutex<VecDeque<bool>>,
    fail_tag: AtomicBool,
    fail_read_only: AtomicBool,
    fail_dispose: AtomicBool,
    urls: Mutex<Vec<String>>,
}

impl FakeState {
    pub fn script_connects(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.connect_script.lock().unwrap().extend(outcomes);
    }

    pub fn fail_tag(&self, fail: bool) {
        self.fail_tag.store(fail, Ordering::SeqCst);
    }

    pub fn fail_read_only(&self, fail: bool) {
        self.fail_read_only.store(fail, Ordering::SeqCst);
    }

    pub fn fail_dispose(&self, fail: bool) {
        self.fail_dispose.store(fail, Ordering::SeqCst);
    }

    pub fn engines_created(&self) -> usize {
        self.engines_created.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

pub struct FakeDriver {
    state: Arc<FakeState>,
}

impl FakeDriver {
    pub fn new(state: Arc<FakeState>) -> Self {
        Self { state }
    }
}

impl Driver for FakeDriver {
    type Engine = FakeEngine;

    fn create_engine(
        &self,
        url: &str,
        _options: &EngineOptions,
        _read_only: bool,
    ) -> DbResult<FakeEngine> {
        let id = self.state.engines_created.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.urls.lock().unwrap().push(url.to_string());
        Ok(FakeEngine {
            id,
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Clone)]
pub struct FakeEngine {
    pub id: usize,
    state: Arc<FakeState>,
}

impl Engine for FakeEngine {
    type Connection = FakeConnection;

    async fn connect(&self) -> DbResult<FakeConnection> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);
        let succeed = self
            .state
            .connect_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(true);
        if !succeed {
            return Err(DbError::connection("scripted failure", "none"));
        }
        self.state.open.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection {
            engine_id: self.id,
            tagged: None,
            read_only: false,
            state: Arc::clone(&self.state),
        })
    }

    async fn dispose(&self) -> DbResult<()> {
        self.state.disposals.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_dispose.load(Ordering::SeqCst) {
            return Err(DbError::internal("scripted disposal failure"));
        }
        Ok(())
    }
}

pub struct FakeConnection {
    pub engine_id: usize,
    pub tagged: Option<String>,
    pub read_only: bool,
    state: Arc<FakeState>,
}

impl Session for FakeConnection {
    async fn tag_version(&mut self, version: &str) -> DbResult<()> {
        if self.state.fail_tag.load(Ordering::SeqCst) {
            return Err(DbError::database("unknown system variable", None, "none"));
        }
        self.tagged = Some(version.to_string());
        Ok(())
    }

    async fn enforce_read_only(&mut self) -> DbResult<()> {
        if self.state.fail_read_only.load(Ordering::SeqCst) {
            return Err(DbError::database("permission denied", None, "none"));
        }
        self.read_only = true;
        Ok(())
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.state.open.fetch_sub(1, Ordering::SeqCst);
    }
}

pub type Fatal = Arc<Mutex<Vec<String>>>;

/// Fatal hook that records instead of exiting.
pub fn recording_hook() -> (FatalHook, Fatal) {
    let seen: Fatal = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let hook: FatalHook = Arc::new(move |err: &DbError| {
        sink.lock().unwrap().push(err.to_string());
    });
    (hook, seen)
}

struct StaticProvider {
    token: Option<String>,
}

impl TokenProvider for StaticProvider {
    fn fetch_token<'a>(&'a self, _resource: &'a str) -> BoxFuture<'a, DbResult<AccessToken>> {
        Box::pin(async move {
            match &self.token {
                Some(token) => Ok(AccessToken {
                    token: token.clone(),
                    expires_at: None,
                }),
                None => Err(DbError::credential("not logged in")),
            }
        })
    }
}

pub fn static_tokens(token: &str) -> Arc<TokenCache> {
    Arc::new(TokenCache::new(
        Arc::new(StaticProvider {
            token: Some(token.to_string()),
        }),
        "test-resource",
    ))
}

pub fn failing_tokens() -> Arc<TokenCache> {
    Arc::new(TokenCache::new(
        Arc::new(StaticProvider { token: None }),
        "test-resource",
    ))
}
