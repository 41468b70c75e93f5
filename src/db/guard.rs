//! Statement guard for read-only databases.
//!
//! Session-level read-only mode can be switched off by the session itself
//! (`SET SESSION ... READ WRITE`, `PRAGMA query_only = OFF`), so statements
//! sent to a read-only database are parsed with sqlparser first. Exactly one
//! plain query is accepted; everything else is refused before a connection
//! is checked out.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

fn dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Accept `sql` only if it is a single read-only statement.
///
/// `sql` must already use positional placeholders (`$1`, `?`).
pub fn check_read_only(database: &str, sql: &str, db_type: DatabaseType) -> DbResult<()> {
    let statements = Parser::parse_sql(dialect(db_type).as_ref(), sql).map_err(|e| {
        DbError::invalid_input(format!(
            "Statement could not be verified as read-only: {}",
            e
        ))
    })?;

    match statements.as_slice() {
        [] => Err(DbError::invalid_input("Empty SQL statement")),
        [statement] => match refused_operation(statement) {
            Some(operation) => Err(DbError::read_only_violation(database, operation)),
            None => Ok(()),
        },
        _ => Err(DbError::read_only_violation(database, "multiple statements")),
    }
}

/// Name of the operation that makes `statement` unsafe, if any.
fn refused_operation(statement: &Statement) -> Option<String> {
    match statement {
        Statement::Query(query) => refused_in_query(query),

        Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. }
        | Statement::ExplainTable { .. } => None,

        // EXPLAIN ANALYZE runs its statement
        Statement::Explain { statement, .. } => refused_operation(statement),

        other => Some(leading_keyword(other)),
    }
}

fn refused_in_query(query: &Query) -> Option<String> {
    if !query.locks.is_empty() {
        return Some("SELECT ... FOR UPDATE".to_string());
    }
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            if let Some(op) = refused_in_query(&cte.query) {
                return Some(op);
            }
        }
    }
    refused_in_body(&query.body)
}

fn refused_in_body(body: &SetExpr) -> Option<String> {
    match body {
        SetExpr::Select(select) if select.into.is_some() => Some("SELECT INTO".to_string()),
        SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => None,
        SetExpr::Query(query) => refused_in_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            refused_in_body(left).or_else(|| refused_in_body(right))
        }
        // Data-modifying CTE bodies and anything newer
        _ => Some("data-modifying query".to_string()),
    }
}

fn leading_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| "statement".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [DatabaseType; 3] = [
        DatabaseType::PostgreSQL,
        DatabaseType::MySQL,
        DatabaseType::SQLite,
    ];

    fn refused(sql: &str, db_type: DatabaseType) -> String {
        match check_read_only("ro", sql, db_type) {
            Err(DbError::ReadOnlyViolation { operation, .. }) => operation,
            other => panic!("{:?} on {:?}: expected a violation, got {:?}", sql, db_type, other),
        }
    }

    #[test]
    fn test_queries_pass() {
        for db_type in ALL {
            for sql in [
                "SELECT 1",
                "WITH recent AS (SELECT * FROM orders) SELECT COUNT(*) FROM recent",
                "SELECT a FROM t1 UNION ALL SELECT b FROM t2",
                "EXPLAIN SELECT * FROM users",
            ] {
                assert!(check_read_only("ro", sql, db_type).is_ok(), "{} {:?}", sql, db_type);
            }
        }
        let pg = "SELECT * FROM t WHERE id = $1";
        assert!(check_read_only("ro", pg, DatabaseType::PostgreSQL).is_ok());
        for db_type in [DatabaseType::MySQL, DatabaseType::SQLite] {
            let sql = "select name from users where age > ? order by name";
            assert!(check_read_only("ro", sql, db_type).is_ok());
        }
        assert!(check_read_only("ro", "SHOW TABLES", DatabaseType::MySQL).is_ok());
    }

    #[test]
    fn test_writes_are_refused() {
        for db_type in ALL {
            assert_eq!(refused("INSERT INTO t VALUES (1)", db_type), "INSERT");
            assert_eq!(refused("UPDATE t SET a = 1", db_type), "UPDATE");
            assert_eq!(refused("DELETE FROM t", db_type), "DELETE");
            assert_eq!(refused("DROP TABLE t", db_type), "DROP");
            assert_eq!(refused("CREATE TABLE t (id INT)", db_type), "CREATE");
        }
    }

    #[test]
    fn test_session_switches_are_refused() {
        // Refused either as a violation or because the parser rejects them
        for (sql, db_type) in [
            ("PRAGMA query_only = OFF", DatabaseType::SQLite),
            ("PRAGMA query_only = 0", DatabaseType::SQLite),
            ("SET SESSION TRANSACTION READ WRITE", DatabaseType::MySQL),
            (
                "SET SESSION CHARACTERISTICS AS TRANSACTION READ WRITE",
                DatabaseType::PostgreSQL,
            ),
        ] {
            assert!(check_read_only("ro", sql, db_type).is_err(), "{}", sql);
        }
        assert_eq!(refused("PRAGMA query_only = 0", DatabaseType::SQLite), "PRAGMA");
    }

    #[test]
    fn test_multiple_statements_are_refused() {
        assert_eq!(
            refused("PRAGMA query_only = 0; DELETE FROM t", DatabaseType::SQLite),
            "multiple statements"
        );
        assert_eq!(
            refused("SELECT 1; SELECT 2", DatabaseType::PostgreSQL),
            "multiple statements"
        );
        assert_eq!(
            refused("SELECT 1; INSERT INTO t VALUES (1)", DatabaseType::MySQL),
            "multiple statements"
        );
    }

    #[test]
    fn test_hidden_writes_are_refused() {
        assert_eq!(
            refused("EXPLAIN ANALYZE DELETE FROM t", DatabaseType::PostgreSQL),
            "DELETE"
        );
        for (sql, db_type) in [
            ("SELECT * INTO backup FROM users", DatabaseType::PostgreSQL),
            ("SELECT * FROM users FOR UPDATE", DatabaseType::MySQL),
            (
                "WITH gone AS (DELETE FROM t RETURNING id) SELECT * FROM gone",
                DatabaseType::PostgreSQL,
            ),
        ] {
            assert!(check_read_only("ro", sql, db_type).is_err(), "{}", sql);
        }
    }

    #[test]
    fn test_unparseable_and_empty_input() {
        for sql in ["", "   ", "SELEKT nonsense"] {
            let err = check_read_only("ro", sql, DatabaseType::SQLite).unwrap_err();
            assert!(
                matches!(err, DbError::InvalidInput { .. } | DbError::ReadOnlyViolation { .. }),
                "{:?}",
                err
            );
        }
    }
}
