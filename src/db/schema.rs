//! Schema introspection module.
//!
//! Reads table and column metadata for one PostgreSQL schema from
//! `information_schema`.
//!
//! # Architecture
//!
//! Two catalog queries are issued: every column of every base table, and
//! primary-key membership. They are joined by table name in memory by
//! [`assemble_tables`], which is pure and unit-tested. Any catalog failure is
//! returned to the caller; introspection is never retried.

use crate::error::{DbError, DbResult};
use crate::models::{ColumnInfo, TableInfo};
use sqlx::{PgPool, Row};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub const LIST_COLUMNS: &str = r#"
        SELECT
            c.table_name,
            c.column_name,
            c.data_type,
            c.udt_schema,
            c.udt_name,
            c.is_nullable,
            c.column_default
        FROM information_schema.columns c
        JOIN information_schema.tables t
            ON t.table_schema = c.table_schema AND t.table_name = c.table_name
        WHERE c.table_schema = $1
        AND t.table_type = 'BASE TABLE'
        ORDER BY c.table_name, c.ordinal_position
        "#;

    pub const LIST_PRIMARY_KEYS: &str = r#"
        SELECT
            kcu.table_name,
            kcu.column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
            AND tc.table_name = kcu.table_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
        AND tc.table_schema = $1
        ORDER BY kcu.table_name, kcu.ordinal_position
        "#;
}

/// One row of the column query.
#[derive(Debug, Clone)]
pub struct ColumnRow {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    /// Underlying type, e.g. `pg_catalog`/`_text` for a `text[]` column
    pub udt_schema: String,
    pub udt_name: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
}

/// Schema inspector for catalog introspection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// Read every base table of `schema` with its ordered columns and primary key.
    pub async fn introspect(pool: &PgPool, schema: &str) -> DbResult<Vec<TableInfo>> {
        let columns = Self::fetch_columns(pool, schema).await?;
        let primary_keys = Self::fetch_primary_keys(pool, schema).await?;

        let tables = assemble_tables(schema, columns, &primary_keys);
        info!(schema, tables = tables.len(), "Introspected schema");
        Ok(tables)
    }

    async fn fetch_columns(pool: &PgPool, schema: &str) -> DbResult<Vec<ColumnRow>> {
        let rows = sqlx::query(queries::LIST_COLUMNS)
            .bind(schema)
            .fetch_all(pool)
            .await
            .map_err(|e| catalog_error(schema, "columns", e))?;

        let columns = rows
            .iter()
            .map(|row| {
                let nullable: String = row.try_get("is_nullable")?;
                Ok(ColumnRow {
                    table_name: row.try_get("table_name")?,
                    column_name: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                    udt_schema: row.try_get("udt_schema")?,
                    udt_name: row.try_get("udt_name")?,
                    is_nullable: nullable == "YES",
                    column_default: row.try_get("column_default")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| catalog_error(schema, "columns", e))?;

        debug!(count = columns.len(), schema, "Fetched catalog columns");
        Ok(columns)
    }

    async fn fetch_primary_keys(
        pool: &PgPool,
        schema: &str,
    ) -> DbResult<BTreeMap<String, BTreeSet<String>>> {
        let rows = sqlx::query(queries::LIST_PRIMARY_KEYS)
            .bind(schema)
            .fetch_all(pool)
            .await
            .map_err(|e| catalog_error(schema, "primary keys", e))?;

        let mut keys: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for row in &rows {
            let table: String = row
                .try_get("table_name")
                .map_err(|e| catalog_error(schema, "primary keys", e))?;
            let column: String = row
                .try_get("column_name")
                .map_err(|e| catalog_error(schema, "primary keys", e))?;
            keys.entry(table).or_default().insert(column);
        }

        debug!(tables = keys.len(), schema, "Fetched primary keys");
        Ok(keys)
    }
}

fn catalog_error(schema: &str, what: &str, err: sqlx::Error) -> DbError {
    DbError::schema(
        format!("Failed to read {} from the catalog: {}", what, DbError::from(err)),
        schema.to_string(),
    )
}

/// Group column rows into tables, preserving row order, and mark primary keys.
pub fn assemble_tables(
    schema: &str,
    columns: Vec<ColumnRow>,
    primary_keys: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<TableInfo> {
    let mut tables: Vec<TableInfo> = Vec::new();

    for row in columns {
        let is_pk = primary_keys
            .get(&row.table_name)
            .is_some_and(|keys| keys.contains(&row.column_name));

        let mut column = ColumnInfo::new(&row.column_name, &row.data_type, row.is_nullable)
            .with_primary_key(is_pk)
            .with_udt(&row.udt_schema, &row.udt_name);
        if let Some(default) = row.column_default {
            column = column.with_default(default);
        }

        match tables.last_mut() {
            Some(table) if table.name == row.table_name => table.push_column(column),
            _ => tables.push(TableInfo::new(&row.table_name, schema).with_column(column)),
        }
    }

    tables
}
