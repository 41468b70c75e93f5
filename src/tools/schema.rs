//! Schema introspection tools.
//!
//! This module implements the `all_table_names`, `filter_table_names` and
//! `schema_definitions` MCP tools. Output is plain text meant to be read by
//! the calling agent.

use crate::db::{DatabaseManager, SchemaInspector};
use crate::error::DbResult;
use crate::models::TableSchema;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Input for the all_table_names tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AllTableNamesInput {
    /// Database name from list_databases (case-insensitive)
    pub database: String,
}

/// Input for the filter_table_names tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FilterTableNamesInput {
    /// Database name from list_databases (case-insensitive)
    pub database: String,
    /// Substring to look for in table names (case-sensitive)
    pub q: String,
}

/// Input for the schema_definitions tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SchemaDefinitionsInput {
    /// Database name from list_databases (case-insensitive)
    pub database: String,
    /// Tables to describe
    pub table_names: Vec<String>,
}

/// Handler for schema-related tools.
pub struct SchemaToolHandler {
    manager: Arc<DatabaseManager>,
}

impl SchemaToolHandler {
    pub fn new(manager: Arc<DatabaseManager>) -> Self {
        Self { manager }
    }

    /// Comma-separated names of every table.
    pub async fn all_table_names(&self, input: AllTableNamesInput) -> DbResult<String> {
        let names = self.table_names(&input.database).await?;
        Ok(names.join(", "))
    }

    /// Comma-separated names of the tables containing `q`.
    pub async fn filter_table_names(&self, input: FilterTableNamesInput) -> DbResult<String> {
        let names = self.table_names(&input.database).await?;
        Ok(filter_names(&names, &input.q).join(", "))
    }

    pub async fn schema_definitions(&self, input: SchemaDefinitionsInput) -> DbResult<String> {
        info!(
            database = %input.database,
            tables = input.table_names.len(),
            "Describing tables"
        );

        let mut conn = self.manager.connect(&input.database).await?;
        let mut sections = Vec::with_capacity(input.table_names.len());
        for table_name in &input.table_names {
            let schema = SchemaInspector::describe_table(&mut conn, table_name).await?;
            sections.push(format_table_schema(&schema));
        }
        Ok(sections.join("\n"))
    }

    async fn table_names(&self, database: &str) -> DbResult<Vec<String>> {
        info!(database = %database, "Listing tables");
        let mut conn = self.manager.connect(database).await?;
        SchemaInspector::table_names(&mut conn).await
    }
}

fn filter_names<'a>(names: &'a [String], q: &str) -> Vec<&'a str> {
    names
        .iter()
        .map(String::as_str)
        .filter(|name| name.contains(q))
        .collect()
}

/// ```text
/// orders:
///     id: primary key, INTEGER, autoincrement
///     customer_id: INTEGER
///     note: TEXT, nullable, default='none'
///
///     Relationships:
///       customer_id -> customers.id
/// ```
pub fn format_table_schema(schema: &TableSchema) -> String {
    let mut lines = vec![format!("{}:", schema.table_name)];

    for column in &schema.columns {
        let mut parts = Vec::new();
        if column.is_primary_key {
            parts.push("primary key".to_string());
        }
        parts.push(column.data_type.to_uppercase());
        if column.nullable {
            parts.push("nullable".to_string());
        }
        if let Some(default) = &column.default_value {
            parts.push(format!("default={}", default));
        }
        if column.auto_increment {
            parts.push("autoincrement".to_string());
        }
        lines.push(format!("    {}: {}", column.name, parts.join(", ")));
    }

    if !schema.foreign_keys.is_empty() {
        lines.push(String::new());
        lines.push("    Relationships:".to_string());
        for fk in &schema.foreign_keys {
            lines.push(format!(
                "      {} -> {}.{}",
                fk.constrained_columns.join(", "),
                fk.referred_table,
                fk.referred_columns.join(", ")
            ));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDefinition, ForeignKey};

    #[test]
    fn test_filter_is_substring_and_case_sensitive() {
        let names: Vec<String> = ["orders", "order_items", "customers", "Orders_archive"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(filter_names(&names, "order"), vec!["orders", "order_items"]);
        assert!(filter_names(&names, "zzz").is_empty());
        assert_eq!(filter_names(&names, "").len(), 4);
    }

    #[test]
    fn test_format_table_schema() {
        let schema = TableSchema::new("orders")
            .with_column(
                ColumnDefinition::new("id", "integer", false)
                    .with_primary_key(true)
                    .with_auto_increment(true),
            )
            .with_column(ColumnDefinition::new("customer_id", "integer", false))
            .with_column(ColumnDefinition::new("note", "varchar(20)", true).with_default("'none'"))
            .with_foreign_key(ForeignKey::new(
                vec!["customer_id".into()],
                "customers",
                vec!["id".into()],
            ));

        assert_eq!(
            format_table_schema(&schema),
            "orders:\n\
             \x20   id: primary key, INTEGER, autoincrement\n\
             \x20   customer_id: INTEGER\n\
             \x20   note: VARCHAR(20), nullable, default='none'\n\
             \n\
             \x20   Relationships:\n\
             \x20     customer_id -> customers.id"
        );
    }

    #[test]
    fn test_format_without_relationships() {
        let schema =
            TableSchema::new("t").with_column(ColumnDefinition::new("a", "TEXT", true));
        assert_eq!(format_table_schema(&schema), "t:\n    a: TEXT, nullable");
    }

    #[test]
    fn test_composite_relationship() {
        let schema = TableSchema::new("line")
            .with_column(ColumnDefinition::new("a", "INT", false))
            .with_foreign_key(ForeignKey::new(
                vec!["a".into(), "b".into()],
                "parent",
                vec!["x".into(), "y".into()],
            ));
        assert!(format_table_schema(&schema).ends_with("      a, b -> parent.x, y"));
    }
}
