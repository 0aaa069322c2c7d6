//! Catalog metadata models.
//!
//! These types hold what the schema introspector reads from `information_schema`.
//! They are immutable once built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Catalog `data_type`, e.g. `character varying`, `jsonb`
    pub data_type: String,
    /// Underlying catalog type as `schema.name`, e.g. `pg_catalog._text`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udt: Option<String>,
    pub nullable: bool,
    /// Raw default expression, e.g. `now()` or `nextval('event_log_event_id_seq'::regclass)`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub is_primary_key: bool,
}

impl ColumnInfo {
    /// Create a new column description.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            udt: None,
            nullable,
            default: None,
            is_primary_key: false,
        }
    }

    /// Set the default expression.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set the underlying catalog type.
    pub fn with_udt(mut self, schema: &str, name: &str) -> Self {
        self.udt = Some(format!("{}.{}", schema, name));
        self
    }

    /// Set whether this column is part of the primary key.
    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    /// True when the engine fills the column if it is omitted on insert.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub schema: String,
    /// Ordered by ordinal position
    pub columns: Vec<ColumnInfo>,
    pub primary_keys: BTreeSet<String>,
}

impl TableInfo {
    /// Create a new, empty table description.
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            columns: Vec::new(),
            primary_keys: BTreeSet::new(),
        }
    }

    /// Add a column definition.
    pub fn with_column(mut self, column: ColumnInfo) -> Self {
        self.push_column(column);
        self
    }

    /// Append a column in place, tracking primary-key membership.
    pub fn push_column(&mut self, column: ColumnInfo) {
        if column.is_primary_key {
            self.primary_keys.insert(column.name.clone());
        }
        self.columns.push(column);
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The primary key column when the key is a single column.
    pub fn single_primary_key(&self) -> Option<&str> {
        if self.primary_keys.len() == 1 {
            self.primary_keys.iter().next().map(String::as_str)
        } else {
            None
        }
    }

    /// Get the fully qualified table name.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}
