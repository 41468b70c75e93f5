//! Schema-related data models.
//!
//! This module defines types for table introspection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        if column.is_primary_key {
            self.primary_key.push(column.name.clone());
        }
        self.columns.push(column);
        self
    }

    pub fn with_foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Type as declared in the database, e.g. "varchar(255)" or "INTEGER"
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    pub auto_increment: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            is_primary_key: false,
            auto_increment: false,
        }
    }

    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    pub fn with_auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }
}

/// Foreign key constraint, possibly spanning several columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub constrained_columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

impl ForeignKey {
    pub fn new(
        constrained_columns: Vec<String>,
        referred_table: impl Into<String>,
        referred_columns: Vec<String>,
    ) -> Self {
        Self {
            constrained_columns,
            referred_table: referred_table.into(),
            referred_columns,
        }
    }
}

/// Group single-column foreign key rows by constraint name, keeping first-seen order.
pub fn group_foreign_keys(rows: Vec<(String, String, String, String)>) -> Vec<ForeignKey> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: std::collections::HashMap<String, ForeignKey> =
        std::collections::HashMap::new();

    for (constraint, column, referred_table, referred_column) in rows {
        match grouped.get_mut(&constraint) {
            Some(fk) => {
                fk.constrained_columns.push(column);
                fk.referred_columns.push(referred_column);
            }
            None => {
                order.push(constraint.clone());
                grouped.insert(
                    constraint,
                    ForeignKey::new(vec![column], referred_table, vec![referred_column]),
                );
            }
        }
    }

    order
        .into_iter()
        .filter_map(|name| grouped.remove(&name))
        .collect()
}
