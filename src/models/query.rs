//! Query-related data models.
//!
//! This module defines bound parameter values, list filters and pagination.

use crate::error::{DbError, DbResult};
use crate::models::record::FieldType;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Default page size for list operations.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Maximum allowed page size.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// A parameter value bound to a positional placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// NULL, typed after the target column when known
    Null(Option<FieldType>),
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    /// Bound as `jsonb`; the driver writes the JSON text form
    Json(JsonValue),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Uuid(Uuid),
    Bytes(Vec<u8>),
    /// Text form of a value whose column type the driver cannot encode;
    /// the statement casts the placeholder to `sql_type` (`schema.name`)
    Cast {
        text: Option<String>,
        sql_type: String,
    },
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_) | Self::Cast { text: None, .. })
    }

    /// Server-side type this parameter must be cast to, if any.
    pub fn cast_type(&self) -> Option<&str> {
        match self {
            Self::Cast { sql_type, .. } => Some(sql_type),
            _ => None,
        }
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null(_) => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
            Self::Timestamp(_) => "timestamp",
            Self::Date(_) => "date",
            Self::Uuid(_) => "uuid",
            Self::Bytes(_) => "bytes",
            Self::Cast { .. } => "cast",
        }
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for QueryParam {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// One list filter on a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Eq(JsonValue),
    /// `{"gte": v}`, `{"lte": v}` or both
    Range {
        gte: Option<JsonValue>,
        lte: Option<JsonValue>,
    },
}

/// Field filters for `list`/`count`, kept in field-name order so the built SQL is stable.
///
/// Null values and empty ranges are dropped on insertion; they never mean "match NULL".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    entries: BTreeMap<String, FilterValue>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality filter. A null value is silently dropped.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.insert(field, FilterValue::Eq(value.into()));
        self
    }

    /// Add a range filter. Missing or null bounds are dropped.
    pub fn range(
        mut self,
        field: impl Into<String>,
        gte: Option<JsonValue>,
        lte: Option<JsonValue>,
    ) -> Self {
        self.insert(field, FilterValue::Range { gte, lte });
        self
    }

    /// Insert a filter, normalizing away nulls.
    pub fn insert(&mut self, field: impl Into<String>, value: FilterValue) {
        let field = field.into();
        let normalized = match value {
            FilterValue::Eq(JsonValue::Null) => None,
            FilterValue::Eq(v) => Some(FilterValue::Eq(v)),
            FilterValue::Range { gte, lte } => {
                let gte = gte.filter(|v| !v.is_null());
                let lte = lte.filter(|v| !v.is_null());
                match (gte, lte) {
                    (None, None) => None,
                    (gte, lte) => Some(FilterValue::Range { gte, lte }),
                }
            }
        };
        match normalized {
            Some(v) => {
                self.entries.insert(field, v);
            }
            None => {
                self.entries.remove(&field);
            }
        }
    }

    /// Build filters from a JSON object such as a request body.
    ///
    /// Objects whose keys are only `gte`/`lte` become range filters; any other
    /// value is an equality filter.
    pub fn from_json(map: &serde_json::Map<String, JsonValue>) -> Self {
        let mut filters = Self::new();
        for (field, value) in map {
            filters.insert(field.clone(), filter_value_from_json(value));
        }
        filters
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.entries.get(field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn filter_value_from_json(value: &JsonValue) -> FilterValue {
    if let JsonValue::Object(obj) = value {
        let is_range = !obj.is_empty() && obj.keys().all(|k| k == "gte" || k == "lte");
        if is_range {
            return FilterValue::Range {
                gte: obj.get("gte").cloned(),
                lte: obj.get("lte").cloned(),
            };
        }
    }
    FilterValue::Eq(value.clone())
}

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    number: u32,
    size: u32,
}

impl Page {
    /// Validate and create a page. `number` starts at 1, `size` is within `1..=MAX_PAGE_SIZE`.
    pub fn new(number: u32, size: u32) -> DbResult<Self> {
        if number < 1 {
            return Err(DbError::invalid_input("Page number must be greater than 0"));
        }
        if size < 1 {
            return Err(DbError::invalid_input("Page size must be greater than 0"));
        }
        if size > MAX_PAGE_SIZE {
            return Err(DbError::invalid_input(format!(
                "Page size cannot exceed {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(Self { number, size })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Rows to skip: `(number - 1) * size`.
    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }

    /// Number of pages needed for `total` rows at this page size.
    pub fn total_pages(&self, total: i64) -> u64 {
        let total = u64::try_from(total).unwrap_or(0);
        total.div_ceil(u64::from(self.size))
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}
