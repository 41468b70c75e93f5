//! Schema introspection.
//!
//! # Architecture
//!
//! SQL lives in the `queries` submodule with constants per backend.
//! Backend-specific code is in the `postgres`, `mysql` and `sqlite`
//! submodules, each providing the same interface. Everything runs against
//! the default schema of the connection (`current_schema()` on PostgreSQL,
//! `DATABASE()` on MySQL, `main` on SQLite).

use crate::db::pool::DbConnection;
use crate::error::{DbError, DbResult};
use crate::models::schema::group_foreign_keys;
use crate::models::{ColumnDefinition, TableSchema};
use tracing::debug;

/// Schema inspector for database introspection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// Base tables in the default schema, sorted by name. Views are excluded.
    pub async fn table_names(conn: &mut DbConnection) -> DbResult<Vec<String>> {
        let names = match conn {
            DbConnection::Postgres(c) => postgres::table_names(c).await?,
            DbConnection::MySql(c) => mysql::table_names(c).await?,
            DbConnection::SQLite(c) => sqlite::table_names(c).await?,
        };
        debug!(count = names.len(), "Listed tables");
        Ok(names)
    }

    /// Columns, primary key and foreign keys of one table.
    pub async fn describe_table(conn: &mut DbConnection, table_name: &str) -> DbResult<TableSchema> {
        let (columns, foreign_key_rows) = match conn {
            DbConnection::Postgres(c) => (
                postgres::columns(c, table_name).await?,
                postgres::foreign_keys(c, table_name).await?,
            ),
            DbConnection::MySql(c) => (
                mysql::columns(c, table_name).await?,
                mysql::foreign_keys(c, table_name).await?,
            ),
            DbConnection::SQLite(c) => (
                sqlite::columns(c, table_name).await?,
                sqlite::foreign_keys(c, table_name).await?,
            ),
        };

        if columns.is_empty() {
            return Err(DbError::schema(
                format!("Table '{}' not found", table_name),
                table_name,
            ));
        }

        let schema = columns
            .into_iter()
            .fold(TableSchema::new(table_name), TableSchema::with_column);
        Ok(group_foreign_keys(foreign_key_rows)
            .into_iter()
            .fold(schema, TableSchema::with_foreign_key))
    }
}

/// (constraint, column, referred table, referred column)
type ForeignKeyRow = (String, String, String, String);

mod queries {
    pub mod postgres {
        pub const LIST_TABLES: &str = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = current_schema()
            AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            c.column_name::text AS column_name,
            format_type(a.atttypid, a.atttypmod) AS column_type,
            c.is_nullable::text AS is_nullable,
            c.column_default::text AS column_default,
            (c.is_identity = 'YES' OR COALESCE(c.column_default, '') LIKE 'nextval(%') AS is_auto,
            EXISTS (
                SELECT 1
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name
                    AND tc.table_schema = kcu.table_schema
                    AND tc.table_name = kcu.table_name
                WHERE tc.constraint_type = 'PRIMARY KEY'
                AND tc.table_schema = c.table_schema
                AND tc.table_name = c.table_name
                AND kcu.column_name = c.column_name
            ) AS is_primary_key
        FROM information_schema.columns c
        JOIN pg_namespace n ON n.nspname = c.table_schema
        JOIN pg_class t ON t.relname = c.table_name AND t.relnamespace = n.oid
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name
        WHERE c.table_name = $1 AND c.table_schema = current_schema()
        ORDER BY c.ordinal_position
        "#;

        // unnest over both key arrays keeps composite keys paired up
        pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
        SELECT
            con.conname::text AS constraint_name,
            att.attname::text AS column_name,
            ref.relname::text AS foreign_table_name,
            ratt.attname::text AS foreign_column_name
        FROM pg_constraint con
        JOIN pg_class cls ON cls.oid = con.conrelid
        JOIN pg_namespace nsp ON nsp.oid = cls.relnamespace
        JOIN pg_class ref ON ref.oid = con.confrelid
        CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, refnum, ord)
        JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.attnum
        JOIN pg_attribute ratt ON ratt.attrelid = con.confrelid AND ratt.attnum = k.refnum
        WHERE con.contype = 'f'
        AND cls.relname = $1
        AND nsp.nspname = current_schema()
        ORDER BY con.conname, k.ord
        "#;
    }

    pub mod mysql {
        pub const LIST_TABLES: &str = r#"
            SELECT CONVERT(TABLE_NAME USING utf8mb4) AS TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE()
            AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8mb4) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8mb4) AS COLUMN_TYPE,
            CONVERT(IS_NULLABLE USING utf8mb4) AS IS_NULLABLE,
            CONVERT(COLUMN_DEFAULT USING utf8mb4) AS COLUMN_DEFAULT,
            CONVERT(COLUMN_KEY USING utf8mb4) AS COLUMN_KEY,
            CONVERT(EXTRA USING utf8mb4) AS EXTRA
        FROM information_schema.COLUMNS
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE()
        ORDER BY ORDINAL_POSITION
        "#;

        pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
        SELECT
            CONVERT(CONSTRAINT_NAME USING utf8mb4) AS CONSTRAINT_NAME,
            CONVERT(COLUMN_NAME USING utf8mb4) AS COLUMN_NAME,
            CONVERT(REFERENCED_TABLE_NAME USING utf8mb4) AS REFERENCED_TABLE_NAME,
            CONVERT(REFERENCED_COLUMN_NAME USING utf8mb4) AS REFERENCED_COLUMN_NAME
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_NAME = ?
        AND TABLE_SCHEMA = DATABASE()
        AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
        "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table'
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;

        pub const DESCRIBE_COLUMNS: &str =
            r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?)"#;

        pub const TABLE_SQL: &str = "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?";

        pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
            SELECT id, "table", "from", "to"
            FROM pragma_foreign_key_list(?)
            ORDER BY id, seq
            "#;
    }
}

mod postgres {
    use super::*;
    use sqlx::{PgConnection, Row};

    pub async fn table_names(conn: &mut PgConnection) -> DbResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(queries::postgres::LIST_TABLES)
            .fetch_all(conn)
            .await?;
        Ok(names)
    }

    pub async fn columns(conn: &mut PgConnection, table_name: &str) -> DbResult<Vec<ColumnDefinition>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(table_name)
            .fetch_all(conn)
            .await?;

        rows.iter()
            .map(|row| -> DbResult<ColumnDefinition> {
                let name: String = row.try_get("column_name")?;
                let column_type: String = row.try_get("column_type")?;
                let nullable: String = row.try_get("is_nullable")?;
                let default_value: Option<String> = row.try_get("column_default")?;
                let is_auto: bool = row.try_get("is_auto")?;
                let is_pk: bool = row.try_get("is_primary_key")?;

                let mut col = ColumnDefinition::new(name, column_type, nullable == "YES")
                    .with_primary_key(is_pk)
                    .with_auto_increment(is_auto);
                if let Some(def) = default_value {
                    col = col.with_default(def);
                }
                Ok(col)
            })
            .collect()
    }

    pub async fn foreign_keys(
        conn: &mut PgConnection,
        table_name: &str,
    ) -> DbResult<Vec<ForeignKeyRow>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_FOREIGN_KEYS)
            .bind(table_name)
            .fetch_all(conn)
            .await?;

        rows.iter()
            .map(|row| -> DbResult<ForeignKeyRow> {
                Ok((
                    row.try_get("constraint_name")?,
                    row.try_get("column_name")?,
                    row.try_get("foreign_table_name")?,
                    row.try_get("foreign_column_name")?,
                ))
            })
            .collect()
    }
}

mod mysql {
    use super::*;
    use sqlx::mysql::MySqlRow;
    use sqlx::{MySqlConnection, Row};

    /// information_schema columns come back as VARBINARY on some servers.
    fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
        if let Ok(v) = row.try_get::<Option<String>, _>(column) {
            return v;
        }
        row.try_get::<Option<Vec<u8>>, _>(column)
            .ok()
            .flatten()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    fn get_string(row: &MySqlRow, column: &str) -> String {
        get_optional_string(row, column).unwrap_or_default()
    }

    pub async fn table_names(conn: &mut MySqlConnection) -> DbResult<Vec<String>> {
        let rows = sqlx::query(queries::mysql::LIST_TABLES)
            .fetch_all(conn)
            .await?;
        Ok(rows.iter().map(|row| get_string(row, "TABLE_NAME")).collect())
    }

    pub async fn columns(
        conn: &mut MySqlConnection,
        table_name: &str,
    ) -> DbResult<Vec<ColumnDefinition>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_COLUMNS)
            .bind(table_name)
            .fetch_all(conn)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let extra = get_string(row, "EXTRA").to_lowercase();
                let mut col = ColumnDefinition::new(
                    get_string(row, "COLUMN_NAME"),
                    get_string(row, "COLUMN_TYPE"),
                    get_string(row, "IS_NULLABLE") == "YES",
                )
                .with_primary_key(get_string(row, "COLUMN_KEY") == "PRI")
                .with_auto_increment(extra.contains("auto_increment"));
                if let Some(def) = get_optional_string(row, "COLUMN_DEFAULT") {
                    col = col.with_default(def);
                }
                col
            })
            .collect())
    }

    pub async fn foreign_keys(
        conn: &mut MySqlConnection,
        table_name: &str,
    ) -> DbResult<Vec<ForeignKeyRow>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_FOREIGN_KEYS)
            .bind(table_name)
            .fetch_all(conn)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    get_string(row, "CONSTRAINT_NAME"),
                    get_string(row, "COLUMN_NAME"),
                    get_string(row, "REFERENCED_TABLE_NAME"),
                    get_string(row, "REFERENCED_COLUMN_NAME"),
                )
            })
            .collect())
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqliteConnection};

    pub async fn table_names(conn: &mut SqliteConnection) -> DbResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(queries::sqlite::LIST_TABLES)
            .fetch_all(conn)
            .await?;
        Ok(names)
    }

    pub async fn columns(
        conn: &mut SqliteConnection,
        table_name: &str,
    ) -> DbResult<Vec<ColumnDefinition>> {
        let rows = sqlx::query(queries::sqlite::DESCRIBE_COLUMNS)
            .bind(table_name)
            .fetch_all(&mut *conn)
            .await?;

        // AUTOINCREMENT only exists on a single INTEGER PRIMARY KEY column
        let table_sql: Option<String> = sqlx::query_scalar(queries::sqlite::TABLE_SQL)
            .bind(table_name)
            .fetch_optional(&mut *conn)
            .await?
            .flatten();
        let has_autoincrement = table_sql
            .map(|sql| sql.to_uppercase().contains("AUTOINCREMENT"))
            .unwrap_or(false);

        rows.iter()
            .map(|row| -> DbResult<ColumnDefinition> {
                let name: String = row.try_get("name")?;
                let data_type: String = row.try_get("type")?;
                let notnull: i64 = row.try_get("notnull")?;
                let default_value: Option<String> = row.try_get("dflt_value")?;
                let pk: i64 = row.try_get("pk")?;

                let is_auto = has_autoincrement && pk > 0 && data_type.eq_ignore_ascii_case("INTEGER");
                // INTEGER PRIMARY KEY columns are implicitly NOT NULL
                let nullable = notnull == 0 && pk == 0;
                let mut col = ColumnDefinition::new(name, data_type, nullable)
                    .with_primary_key(pk > 0)
                    .with_auto_increment(is_auto);
                if let Some(def) = default_value {
                    col = col.with_default(def);
                }
                Ok(col)
            })
            .collect()
    }

    pub async fn foreign_keys(
        conn: &mut SqliteConnection,
        table_name: &str,
    ) -> DbResult<Vec<ForeignKeyRow>> {
        let rows = sqlx::query(queries::sqlite::DESCRIBE_FOREIGN_KEYS)
            .bind(table_name)
            .fetch_all(conn)
            .await?;

        rows.iter()
            .map(|row| -> DbResult<ForeignKeyRow> {
                let id: i64 = row.try_get("id")?;
                let referred_column: Option<String> = row.try_get("to")?;
                Ok((
                    id.to_string(),
                    row.try_get("from")?,
                    row.try_get("table")?,
                    // NULL "to" means the referenced table's primary key
                    referred_column.unwrap_or_default(),
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineOptions;
    use crate::db::driver::{Driver, Engine};
    use crate::db::pool::SqlxDriver;

    async fn seeded() -> DbConnection {
        let engine = SqlxDriver
            .create_engine(
                "sqlite::memory:",
                &EngineOptions {
                    pool_size: 1,
                    max_overflow: 0,
                    ..EngineOptions::default()
                },
                false,
            )
            .unwrap();
        let mut conn = engine.connect().await.unwrap();
        let DbConnection::SQLite(c) = &mut conn else {
            unreachable!()
        };
        sqlx::raw_sql(
            "CREATE TABLE customers (id INTEGER PRIMARY KEY AUTOINCREMENT, email TEXT NOT NULL, \
                 region TEXT DEFAULT 'eu');
             CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES customers(id), \
                 total NUMERIC);
             CREATE VIEW big_orders AS SELECT * FROM orders WHERE total > 100;",
        )
        .execute(&mut **c)
        .await
        .unwrap();
        conn
    }

    #[tokio::test]
    async fn test_table_names_excludes_views_and_internal_tables() {
        let mut conn = seeded().await;
        let names = SchemaInspector::table_names(&mut conn).await.unwrap();
        assert_eq!(names, vec!["customers", "orders"]);
    }

    #[tokio::test]
    async fn test_describe_table() {
        let mut conn = seeded().await;
        let customers = SchemaInspector::describe_table(&mut conn, "customers")
            .await
            .unwrap();
        assert_eq!(customers.primary_key, vec!["id"]);
        assert!(customers.columns[0].auto_increment);
        assert!(!customers.columns[0].nullable);
        assert!(!customers.columns[1].nullable);
        assert_eq!(customers.columns[2].default_value.as_deref(), Some("'eu'"));
        assert!(customers.foreign_keys.is_empty());

        let orders = SchemaInspector::describe_table(&mut conn, "orders")
            .await
            .unwrap();
        assert!(!orders.columns[0].auto_increment);
        assert_eq!(orders.foreign_keys.len(), 1);
        assert_eq!(orders.foreign_keys[0].constrained_columns, vec!["customer_id"]);
        assert_eq!(orders.foreign_keys[0].referred_table, "customers");
        assert_eq!(orders.foreign_keys[0].referred_columns, vec!["id"]);
    }

    #[tokio::test]
    async fn test_describe_missing_table() {
        let mut conn = seeded().await;
        let err = SchemaInspector::describe_table(&mut conn, "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Schema { .. }));
    }
}
