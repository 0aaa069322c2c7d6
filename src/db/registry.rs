//! Record-shape registry.
//!
//! Maps table names to their [`RecordShape`]. The registry is filled once,
//! either from declared shapes or from the live catalog, and is read-only
//! afterwards: loading takes `&mut self`, and callers share the loaded
//! registry behind an `Arc`. Later load calls are logged and ignored.

use crate::db::schema::SchemaInspector;
use crate::db::types::map_sql_type;
use crate::error::{DbError, DbResult};
use crate::models::{FieldSpec, FieldType, Presence, RecordShape, TableInfo};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct ShapeRegistry {
    shapes: BTreeMap<String, Arc<RecordShape>>,
    loaded: bool,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Register declared shapes. Every shape is checked before any is stored.
    pub fn load_declared(
        &mut self,
        shapes: impl IntoIterator<Item = RecordShape>,
    ) -> DbResult<usize> {
        if self.already_loaded() {
            return Ok(self.len());
        }

        let shapes: Vec<RecordShape> = shapes.into_iter().collect();
        for shape in &shapes {
            shape.check()?;
        }
        for shape in shapes {
            self.shapes.insert(shape.table().to_string(), Arc::new(shape));
        }
        self.loaded = true;

        info!(tables = self.len(), source = "declared", "Loaded record shapes");
        Ok(self.len())
    }

    /// Introspect `schema` and register a shape for every table with a usable key.
    ///
    /// `declared` supplies primary keys and JSON-field sets for tables it names.
    /// Tables named in `exclude` (such as the migration ledger) are not served.
    pub async fn load_from_catalog(
        &mut self,
        pool: &PgPool,
        schema: &str,
        declared: &[RecordShape],
        exclude: &[&str],
    ) -> DbResult<usize> {
        if self.already_loaded() {
            return Ok(self.len());
        }
        let mut tables = SchemaInspector::introspect(pool, schema).await?;
        tables.retain(|t| !exclude.contains(&t.name.as_str()));
        Ok(self.load_tables(&tables, declared))
    }

    /// Register shapes derived from already-introspected tables.
    pub fn load_tables(&mut self, tables: &[TableInfo], declared: &[RecordShape]) -> usize {
        if self.already_loaded() {
            return self.len();
        }

        for table in tables {
            let hint = declared.iter().find(|s| s.table() == table.name);
            if let Some(shape) = shape_from_table(table, hint) {
                self.shapes.insert(table.name.clone(), Arc::new(shape));
            }
        }
        self.loaded = true;

        info!(
            tables = self.len(),
            skipped = tables.len().saturating_sub(self.len()),
            source = "catalog",
            "Loaded record shapes"
        );
        self.len()
    }

    fn already_loaded(&self) -> bool {
        if self.loaded {
            warn!(tables = self.len(), "Record shapes already loaded, ignoring reload");
        }
        self.loaded
    }

    pub fn get(&self, table: &str) -> Option<Arc<RecordShape>> {
        self.shapes.get(table).cloned()
    }

    /// Like [`get`](Self::get) but an unknown table is an error.
    pub fn shape(&self, table: &str) -> DbResult<Arc<RecordShape>> {
        self.get(table)
            .ok_or_else(|| DbError::unknown_table(table))
    }

    /// A copy of the whole table map.
    pub fn all_shapes(&self) -> BTreeMap<String, Arc<RecordShape>> {
        self.shapes.clone()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.shapes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

/// Build a shape from catalog metadata.
///
/// The key is the declared one when `declared` names it and the catalog agrees,
/// else the table's single primary-key column. Returns `None` (with a warning)
/// when neither is usable. Column presence follows the catalog: nullable or
/// unmapped columns are optional, columns with a default are generated, the
/// rest are required.
pub fn shape_from_table(table: &TableInfo, declared: Option<&RecordShape>) -> Option<RecordShape> {
    let primary_key = match declared {
        Some(shape) if table.primary_keys.contains(shape.primary_key()) => {
            shape.primary_key().to_string()
        }
        Some(shape) => {
            warn!(
                table = %table.name,
                declared = shape.primary_key(),
                catalog = ?table.primary_keys,
                "Declared primary key is not part of the table's primary key, skipping table"
            );
            return None;
        }
        None => match table.single_primary_key() {
            Some(pk) => pk.to_string(),
            None => {
                warn!(
                    table = %table.name,
                    keys = table.primary_keys.len(),
                    "Table has no single-column primary key, skipping table"
                );
                return None;
            }
        },
    };

    let fields = table.columns.iter().map(|column| {
        let (field_type, forced_optional) = map_sql_type(&column.data_type);
        let presence = if forced_optional || column.nullable {
            Presence::Optional
        } else if column.has_default() {
            Presence::Generated
        } else {
            Presence::Required
        };
        let field = FieldSpec::new(&column.name, field_type, presence);
        match (field_type, &column.udt) {
            (FieldType::Any, Some(udt)) => field.with_sql_type(udt),
            _ => field,
        }
    });

    let json_fields: Vec<String> = declared
        .map(|shape| {
            shape
                .json_fields()
                .iter()
                .filter(|f| table.column(f).is_some())
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let shape = RecordShape::new(&table.name, primary_key)
        .with_schema(&table.schema)
        .with_fields(fields)
        .with_json_fields(json_fields);

    debug!(
        table = %table.name,
        primary_key = shape.primary_key(),
        fields = shape.fields().len(),
        "Derived record shape from catalog"
    );
    Some(shape)
}
