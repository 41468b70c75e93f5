//! Named parameter handling.
//!
//! Queries use `:name` placeholders. Before execution they are rewritten to
//! the positional form the backend understands (`$1` for PostgreSQL, `?`
//! for MySQL and SQLite) and the values are bound in placeholder order.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam};
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};
use std::collections::HashMap;

/// A statement rewritten to positional placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    pub sql: String,
    /// Parameter name for each bind slot, in bind order.
    pub bind_order: Vec<String>,
}

impl PreparedStatement {
    /// Resolve bind values from the caller's parameter map.
    pub fn bind_values(&self, params: &HashMap<String, JsonValue>) -> DbResult<Vec<QueryParam>> {
        self.bind_order
            .iter()
            .map(|name| {
                params
                    .get(name)
                    .cloned()
                    .map(QueryParam::from)
                    .ok_or_else(|| {
                        DbError::invalid_input(format!(
                            "Missing value for query parameter ':{}'",
                            name
                        ))
                    })
            })
            .collect()
    }
}

/// Rewrite `:name` placeholders for the given backend.
///
/// String literals (including PostgreSQL `$tag$` bodies), quoted identifiers,
/// comments and `::` casts are left untouched. On PostgreSQL a repeated name
/// reuses its first index; the other backends get one `?` (and one bind slot)
/// per occurrence.
pub fn rewrite_named_params(sql: &str, db_type: DatabaseType) -> DbResult<PreparedStatement> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut bind_order: Vec<String> = Vec::new();
    let mut pg_index: HashMap<String, usize> = HashMap::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                let end = skip_quoted(&chars, i, c, db_type == DatabaseType::MySQL).ok_or_else(|| {
                    DbError::invalid_input(format!("Unterminated quote {} in query", c))
                })?;
                out.extend(&chars[i..end]);
                i = end;
            }
            '$' if db_type == DatabaseType::PostgreSQL
                && !(i > 0 && is_ident_char(chars[i - 1])) =>
            {
                let Some(tag_len) = dollar_tag_len(&chars, i) else {
                    out.push(c);
                    i += 1;
                    continue;
                };
                let end = skip_dollar_quoted(&chars, i, tag_len).ok_or_else(|| {
                    DbError::invalid_input("Unterminated dollar-quoted string in query")
                })?;
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map_or(chars.len(), |p| i + p);
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let end = find_block_comment_end(&chars, i + 2);
                out.extend(&chars[i..end]);
                i = end;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' if chars.get(i + 1).is_some_and(|ch| is_ident_start(*ch))
                && !(i > 0 && is_ident_char(chars[i - 1])) =>
            {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                match db_type {
                    DatabaseType::PostgreSQL => {
                        let next = pg_index.len() + 1;
                        let index = *pg_index.entry(name.clone()).or_insert_with(|| {
                            bind_order.push(name.clone());
                            next
                        });
                        out.push('$');
                        out.push_str(&index.to_string());
                    }
                    DatabaseType::MySQL | DatabaseType::SQLite => {
                        bind_order.push(name);
                        out.push('?');
                    }
                }
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok(PreparedStatement {
        sql: out,
        bind_order,
    })
}

/// Index just past the closing quote. Doubled quotes are escapes, and so is
/// a backslash inside MySQL string literals.
fn skip_quoted(chars: &[char], start: usize, quote: char, backslash: bool) -> Option<usize> {
    let mut i = start + 1;
    while i < chars.len() {
        if backslash && chars[i] == '\\' && quote == '\'' {
            i += 2;
            continue;
        }
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

/// Length of the `$tag$` opener at `start`, if there is one. Tags follow
/// identifier rules, so `$1` is a placeholder and not a tag.
fn dollar_tag_len(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if chars.get(i).is_some_and(|c| is_ident_start(*c)) {
        while i < chars.len() && is_ident_char(chars[i]) {
            i += 1;
        }
    }
    (chars.get(i) == Some(&'$')).then_some(i + 1 - start)
}

/// Index just past the closing tag matching the opener at `start`.
fn skip_dollar_quoted(chars: &[char], start: usize, tag_len: usize) -> Option<usize> {
    let tag = &chars[start..start + tag_len];
    let body = start + tag_len;
    chars[body..]
        .windows(tag_len)
        .position(|window| window == tag)
        .map(|p| body + p + tag_len)
}

fn find_block_comment_end(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// =============================================================================
// Binding
// =============================================================================

pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        // No native JSON type; stored as text
        QueryParam::Json(v) => query.bind(v.to_string()),
    }
}
