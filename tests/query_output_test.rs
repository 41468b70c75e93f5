//! End-to-end rendering of query results through the execute_query tool.
//!
//! Covers NULL and temporal rendering, UTF-8 text, binary data, row caps and
//! every output format.

use db_alchemy_mcp::auth::TokenCache;
use db_alchemy_mcp::config::EngineOptions;
use db_alchemy_mcp::db::{ConnectContext, DatabaseManager, QueryExecutor, SqlxDriver};
use db_alchemy_mcp::tools::format::OutputFormat;
use db_alchemy_mcp::tools::query::{ExecuteQueryInput, QueryToolHandler};
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn manager(dir: &TempDir) -> Arc<DatabaseManager> {
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("out.db").display());
    let ctx = ConnectContext::new(
        SqlxDriver,
        EngineOptions::default(),
        Arc::new(TokenCache::azure_cli()),
    );
    Arc::new(DatabaseManager::from_vars([("DB_APP_URL", url)], ctx).unwrap())
}

fn input(sql: &str, format: OutputFormat) -> ExecuteQueryInput {
    ExecuteQueryInput {
        database: "app".into(),
        query: sql.into(),
        params: None,
        format,
    }
}

async fn seed(handler: &QueryToolHandler) {
    let statements = [
        "CREATE TABLE events (id INTEGER PRIMARY KEY, title TEXT, note TEXT, \
         happened_on DATE, happened_at DATETIME, payload BLOB)",
        "INSERT INTO events (title, note, happened_on, happened_at, payload) VALUES \
         ('Café 日本', NULL, '2024-03-01', '2024-03-01 09:30:00', x'00ff')",
        "INSERT INTO events (title, note, happened_on, happened_at, payload) VALUES \
         ('', 'empty title', '2024-03-02', '2024-03-02T10:00:00.250', x'68656c6c6f')",
    ];
    for sql in statements {
        let text = handler.execute_query(input(sql, OutputFormat::Vertical)).await;
        assert!(text.starts_with("Success"), "{}", text);
    }
}

#[tokio::test]
async fn test_vertical_rendering_of_special_values() {
    let dir = tempfile::tempdir().unwrap();
    let handler = QueryToolHandler::new(manager(&dir));
    seed(&handler).await;

    let text = handler
        .execute_query(input(
            "SELECT title, note, happened_on, happened_at FROM events ORDER BY id",
            OutputFormat::Vertical,
        ))
        .await;
    assert_eq!(
        text,
        "1. row\n\
         title: Café 日本\n\
         note: NULL\n\
         happened_on: 2024-03-01\n\
         happened_at: 2024-03-01T09:30:00\n\
         \n\
         2. row\n\
         title: \n\
         note: empty title\n\
         happened_on: 2024-03-02\n\
         happened_at: 2024-03-02T10:00:00.250\n\
         \n\
         Result: 2 rows"
    );
}

#[tokio::test]
async fn test_json_format_values() {
    let dir = tempfile::tempdir().unwrap();
    let handler = QueryToolHandler::new(manager(&dir));
    seed(&handler).await;

    let text = handler
        .execute_query(input(
            "SELECT id, note, payload FROM events ORDER BY id",
            OutputFormat::Json,
        ))
        .await;
    let parsed: JsonValue = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["columns"], json!(["id", "note", "payload"]));
    assert_eq!(parsed["rows"][0]["note"], JsonValue::Null);
    // Non UTF-8 bytes fall back to base64, text bytes stay readable
    assert_eq!(parsed["rows"][0]["payload"], json!("AP8="));
    assert_eq!(parsed["rows"][1]["payload"], json!("hello"));
    assert_eq!(parsed["database_row_count"], json!(2));
}

#[tokio::test]
async fn test_table_and_markdown_formats() {
    let dir = tempfile::tempdir().unwrap();
    let handler = QueryToolHandler::new(manager(&dir));
    seed(&handler).await;

    let table = handler
        .execute_query(input(
            "SELECT id, title FROM events ORDER BY id",
            OutputFormat::Table,
        ))
        .await;
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines[1], "| id |   title   |");
    assert_eq!(lines[3], "|  1 | Café 日本 |");
    assert_eq!(lines.last(), Some(&"2 rows in set"));

    let markdown = handler
        .execute_query(input(
            "SELECT id, title FROM events ORDER BY id",
            OutputFormat::Markdown,
        ))
        .await;
    assert!(markdown.starts_with("| id | title |\n|---|---|\n| 1 | Café 日本 |\n| 2 |  |\n"));
}

#[tokio::test]
async fn test_row_cap_and_char_budget() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let handler = QueryToolHandler::with_limits(manager.clone(), QueryExecutor::new(10), 4000);

    let series = "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 25) \
                  SELECT x FROM n";

    let json_text = handler.execute_query(input(series, OutputFormat::Json)).await;
    let parsed: JsonValue = serde_json::from_str(&json_text).unwrap();
    assert_eq!(parsed["truncated"], json!(true));
    assert_eq!(parsed["database_row_count"], json!(25));
    assert_eq!(parsed["returned_row_count"], json!(10));

    let vertical = handler.execute_query(input(series, OutputFormat::Vertical)).await;
    assert!(vertical.ends_with("Result: showing first 10 rows (output truncated)"));

    // "N. row\nx: N\n\n" costs 13 chars for one-digit N
    let tight = QueryToolHandler::with_limits(manager, QueryExecutor::default(), 30);
    let vertical = tight.execute_query(input(series, OutputFormat::Vertical)).await;
    assert_eq!(
        vertical,
        "1. row\nx: 1\n\n2. row\nx: 2\n\nResult: showing first 2 rows (output truncated)"
    );
}

#[tokio::test]
async fn test_no_rows_and_named_params() {
    let dir = tempfile::tempdir().unwrap();
    let handler = QueryToolHandler::new(manager(&dir));
    seed(&handler).await;

    let mut query = input(
        "SELECT title FROM events WHERE happened_on = :day AND title <> ':day'",
        OutputFormat::Vertical,
    );
    query.params = Some(HashMap::from([("day".to_string(), json!("2024-12-25"))]));
    assert_eq!(handler.execute_query(query.clone()).await, "No rows returned");

    query.params = Some(HashMap::from([("day".to_string(), json!("2024-03-01"))]));
    assert_eq!(
        handler.execute_query(query.clone()).await,
        "1. row\ntitle: Café 日本\n\nResult: 1 rows"
    );

    query.params = None;
    let text = handler.execute_query(query).await;
    assert_eq!(
        text,
        "Error: Invalid input: Missing value for query parameter ':day'"
    );
}
