//! Statement execution.
//!
//! A statement runs on a connection checked out through the database
//! manager. Rows are streamed; only the first `max_rows` are decoded and
//! kept, the rest are counted so the caller learns the true size.
//!
//! # Architecture
//!
//! One submodule per backend (`mysql`, `postgres`, `sqlite`) with parallel
//! structure so the differences stand out.

use crate::db::params::rewrite_named_params;
use crate::db::pool::DbConnection;
use crate::db::types::RowValues;
use crate::error::DbResult;
use crate::models::{DEFAULT_MAX_ROWS, QueryParam, RowCollector, StatementOutcome};
use futures_util::TryStreamExt;
use serde_json::Value as JsonValue;
use sqlx::Either;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Statements starting with one of these always produce a row set, even an
/// empty one.
const ROW_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "PRAGMA", "VALUES", "TABLE",
];

#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor {
    max_rows: usize,
}

impl QueryExecutor {
    pub fn new(max_rows: usize) -> Self {
        Self {
            max_rows: max_rows.max(1),
        }
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Run one statement with named parameters.
    pub async fn execute(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        params: &HashMap<String, JsonValue>,
    ) -> DbResult<StatementOutcome> {
        let start = Instant::now();
        let prepared = rewrite_named_params(sql, conn.db_type())?;
        let values = prepared.bind_values(params)?;

        debug!(
            db_type = %conn.db_type(),
            params = values.len(),
            max_rows = self.max_rows,
            "Executing statement"
        );

        let mut collector = RowCollector::new(Vec::new(), self.max_rows);
        let rows_affected = match conn {
            DbConnection::MySql(c) => {
                mysql::run(c, &prepared.sql, &values, &mut collector).await?
            }
            DbConnection::Postgres(c) => {
                postgres::run(c, &prepared.sql, &values, &mut collector).await?
            }
            DbConnection::SQLite(c) => {
                sqlite::run(c, &prepared.sql, &values, &mut collector).await?
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;

        if collector.seen() == 0 && !returns_rows(sql) {
            debug!(rows_affected, elapsed_ms, "Statement completed");
            return Ok(StatementOutcome::Affected { rows_affected });
        }

        let result = collector.finish();
        if result.truncated {
            warn!(
                total_rows = result.database_row_count,
                kept = result.returned_row_count,
                "Query result truncated"
            );
        }
        debug!(rows = result.database_row_count, elapsed_ms, "Query completed");
        Ok(StatementOutcome::Rows(result))
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROWS)
    }
}

/// Whether the statement's leading keyword marks it as a query.
pub fn returns_rows(sql: &str) -> bool {
    leading_keyword(sql)
        .map(|kw| ROW_KEYWORDS.contains(&kw.as_str()))
        .unwrap_or(false)
}

/// First keyword, skipping whitespace, comments and opening parentheses.
fn leading_keyword(sql: &str) -> Option<String> {
    let mut rest = sql;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }

    let word: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    (!word.is_empty()).then(|| word.to_ascii_uppercase())
}

fn collect_row<R: RowValues>(collector: &mut RowCollector, row: &R) {
    if !collector.has_columns() {
        collector.set_columns(row.column_names());
    }
    collector.push_with(|| row.to_values());
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Statements without parameters go through the unprepared path so that
// commands which cannot be prepared (SHOW, SET, some PRAGMAs) still work.
// That path accepts several statements at once; statements for read-only
// databases are limited to one by `guard::check_read_only` beforehand.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use sqlx::{Executor, MySqlConnection};

    pub async fn run(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
        collector: &mut RowCollector,
    ) -> DbResult<u64> {
        let mut stream = if params.is_empty() {
            conn.fetch_many(sql)
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            conn.fetch_many(query)
        };

        let mut rows_affected = 0;
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => rows_affected += done.rows_affected(),
                Either::Right(row) => collect_row(collector, &row),
            }
        }
        Ok(rows_affected)
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use sqlx::{Executor, PgConnection};

    pub async fn run(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
        collector: &mut RowCollector,
    ) -> DbResult<u64> {
        let mut stream = if params.is_empty() {
            conn.fetch_many(sql)
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            conn.fetch_many(query)
        };

        let mut rows_affected = 0;
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => rows_affected += done.rows_affected(),
                Either::Right(row) => collect_row(collector, &row),
            }
        }
        Ok(rows_affected)
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::{Executor, SqliteConnection};

    pub async fn run(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
        collector: &mut RowCollector,
    ) -> DbResult<u64> {
        let mut stream = if params.is_empty() {
            conn.fetch_many(sql)
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            conn.fetch_many(query)
        };

        let mut rows_affected = 0;
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => rows_affected += done.rows_affected(),
                Either::Right(row) => collect_row(collector, &row),
            }
        }
        Ok(rows_affected)
    }
}
