//! Randomized tests for the parameter rewriter and the query tool.
//!
//! Random, malicious and edge-case inputs must never panic: they either run
//! or come back as an `Error: ...` text.

use db_alchemy_mcp::auth::TokenCache;
use db_alchemy_mcp::config::EngineOptions;
use db_alchemy_mcp::db::params::rewrite_named_params;
use db_alchemy_mcp::db::{ConnectContext, DatabaseManager, QueryExecutor, SqlxDriver};
use db_alchemy_mcp::models::{DatabaseType, QueryResult};
use db_alchemy_mcp::tools::format::{OutputFormat, format_result, format_vertical};
use db_alchemy_mcp::tools::query::{ExecuteQueryInput, QueryToolHandler};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::Arc;

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Random text drawn mostly from characters the rewriter cares about.
fn random_sql_like(len: usize) -> String {
    const ALPHABET: &[char] = &[
        ':', ':', '\'', '"', '`', '-', '/', '*', '\\', '\n', ' ', 'a', 'b', '_', '1', '$', '?',
        'é', '日',
    ];
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())])
        .collect()
}

fn edge_case_strings() -> Vec<String> {
    vec![
        String::new(),
        " ".to_string(),
        "\n\r\t".to_string(),
        "\0".to_string(),
        "🚀".repeat(100),
        "'OR 1=1--".to_string(),
        "'; DROP TABLE users--".to_string(),
        "SELECT :".to_string(),
        "SELECT ::".to_string(),
        "SELECT :a:b::c".to_string(),
        "/* unterminated".to_string(),
        "SELECT \"open".to_string(),
        "a".repeat(10_000),
        random_string(100),
        "\u{0000}\u{FFFF}".to_string(),
    ]
}

fn setup() -> QueryToolHandler {
    let ctx = ConnectContext::new(
        SqlxDriver,
        EngineOptions {
            pool_size: 1,
            max_overflow: 0,
            ..EngineOptions::default()
        },
        Arc::new(TokenCache::azure_cli()),
    );
    let manager = DatabaseManager::from_vars([("DB_FUZZ_URL", "sqlite::memory:")], ctx).unwrap();
    QueryToolHandler::with_limits(Arc::new(manager), QueryExecutor::new(50), 500)
}

#[test]
fn fuzz_rewriter_never_panics() {
    let mut inputs = edge_case_strings();
    for len in [1, 5, 20, 200] {
        for _ in 0..200 {
            inputs.push(random_sql_like(len));
        }
    }

    for sql in &inputs {
        for db_type in [DatabaseType::PostgreSQL, DatabaseType::MySQL, DatabaseType::SQLite] {
            if let Ok(stmt) = rewrite_named_params(sql, db_type) {
                // Every bind slot has a name, and ? placeholders match slots
                assert!(stmt.bind_order.iter().all(|n| !n.is_empty()));
                if db_type == DatabaseType::PostgreSQL {
                    for i in 1..=stmt.bind_order.len() {
                        assert!(stmt.sql.contains(&format!("${}", i)), "{:?}", sql);
                    }
                }
            }
        }
    }
}

#[test]
fn fuzz_rewriter_without_placeholders_is_identity() {
    for _ in 0..500 {
        let sql = random_string(rand::thread_rng().gen_range(0..80));
        let stmt = rewrite_named_params(&sql, DatabaseType::SQLite).unwrap();
        assert_eq!(stmt.sql, sql);
        assert!(stmt.bind_order.is_empty());
    }
}

#[test]
fn fuzz_vertical_budget_is_respected() {
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let rows: Vec<Vec<JsonValue>> = (0..rng.gen_range(0..60))
            .map(|i| vec![json!(i), json!(random_string(rng.gen_range(0..40)))])
            .collect();
        let result = QueryResult::from_rows(vec!["id".into(), "text".into()], rows, 1000);
        let budget = rng.gen_range(1..2000);
        let text = format_vertical(&result, budget);

        let footer_len = text.lines().last().map_or(0, |l| l.chars().count());
        let body_len = text.chars().count().saturating_sub(footer_len);
        assert!(body_len <= budget, "body {} > budget {}", body_len, budget);

        for format in [OutputFormat::Table, OutputFormat::Markdown, OutputFormat::Json] {
            assert!(!format_result(&result, format, budget).is_empty());
        }
    }
}

#[tokio::test]
async fn fuzz_execute_query_returns_text() {
    let handler = setup();
    for sql in edge_case_strings() {
        let text = handler
            .execute_query(ExecuteQueryInput {
                database: "fuzz".into(),
                query: sql.clone(),
                params: None,
                format: OutputFormat::Vertical,
            })
            .await;
        assert!(!text.is_empty(), "empty output for {:?}", sql);
    }
}

#[tokio::test]
async fn fuzz_params_are_bound_not_interpolated() {
    let handler = setup();
    for value in edge_case_strings() {
        let text = handler
            .execute_query(ExecuteQueryInput {
                database: "FUZZ".into(),
                query: "SELECT length(:v) AS n".into(),
                params: Some(HashMap::from([("v".to_string(), json!(value.clone()))])),
                format: OutputFormat::Json,
            })
            .await;
        assert!(!text.starts_with("Error"), "{:?} -> {}", value, text);
    }
}

#[tokio::test]
async fn fuzz_random_database_names() {
    let handler = setup();
    for _ in 0..50 {
        let name = random_string(12);
        let text = handler
            .execute_query(ExecuteQueryInput {
                database: name,
                query: "SELECT 1".into(),
                params: None,
                format: OutputFormat::Vertical,
            })
            .await;
        assert!(text.contains("is not configured"), "{}", text);
    }
}
