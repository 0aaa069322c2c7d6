//! Record shapes and records.
//!
//! A [`RecordShape`] describes one table's row: its fields with semantic types,
//! which field is the primary key and which fields hold nested JSON. Shapes are
//! either declared with [`define_table!`](crate::define_table) or derived from
//! catalog metadata; the executor treats both the same way.
//!
//! Shapes also own the conversion between JSON field maps and bound parameters,
//! so a field map is fully validated before any SQL is built.

use crate::error::{DbError, DbResult};
use crate::models::query::QueryParam;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

/// Semantic type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
    Date,
    Json,
    Uuid,
    Binary,
    /// Unmapped catalog type; values pass through unchanged
    Any,
}

impl FieldType {
    /// Rust type used for this field in generated declarations.
    pub fn rust_type(&self) -> &'static str {
        match self {
            Self::Integer => "i64",
            Self::Float => "f64",
            Self::Text => "String",
            Self::Boolean => "bool",
            Self::Timestamp => "DateTime<Utc>",
            Self::Date => "NaiveDate",
            Self::Json | Self::Any => "serde_json::Value",
            Self::Uuid => "uuid::Uuid",
            Self::Binary => "String",
        }
    }

    /// Convert a JSON value into a bound parameter of this type.
    pub fn to_param(&self, value: &JsonValue) -> Result<QueryParam, String> {
        if value.is_null() {
            return Ok(QueryParam::Null(Some(*self)));
        }
        match self {
            Self::Integer => value
                .as_i64()
                .map(QueryParam::Int)
                .ok_or_else(|| format!("expected an integer, got {}", describe(value))),
            Self::Float => value
                .as_f64()
                .map(QueryParam::Float)
                .ok_or_else(|| format!("expected a number, got {}", describe(value))),
            Self::Text => value
                .as_str()
                .map(|s| QueryParam::String(s.to_string()))
                .ok_or_else(|| format!("expected a string, got {}", describe(value))),
            Self::Boolean => value
                .as_bool()
                .map(QueryParam::Bool)
                .ok_or_else(|| format!("expected a boolean, got {}", describe(value))),
            Self::Timestamp => {
                let s = expect_str(value, "an RFC 3339 timestamp")?;
                parse_timestamp(s)
                    .map(QueryParam::Timestamp)
                    .ok_or_else(|| format!("invalid timestamp '{}'", s))
            }
            Self::Date => {
                let s = expect_str(value, "a date (YYYY-MM-DD)")?;
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(QueryParam::Date)
                    .map_err(|_| format!("invalid date '{}'", s))
            }
            Self::Json => Ok(QueryParam::Json(value.clone())),
            Self::Uuid => {
                let s = expect_str(value, "a UUID")?;
                Uuid::parse_str(s)
                    .map(QueryParam::Uuid)
                    .map_err(|_| format!("invalid UUID '{}'", s))
            }
            Self::Binary => {
                let s = expect_str(value, "base64 data")?;
                STANDARD
                    .decode(s)
                    .map(QueryParam::Bytes)
                    .map_err(|e| format!("invalid base64: {}", e))
            }
            Self::Any => Ok(untyped_param(value)),
        }
    }

    /// Parse a raw string (path segment, query string) into a JSON value of this type.
    pub fn parse_str(&self, raw: &str) -> Result<JsonValue, String> {
        match self {
            Self::Integer => raw
                .parse::<i64>()
                .map(JsonValue::from)
                .map_err(|_| format!("'{}' is not an integer", raw)),
            Self::Float => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number)
                .ok_or_else(|| format!("'{}' is not a number", raw)),
            Self::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(JsonValue::Bool(true)),
                "false" | "0" => Ok(JsonValue::Bool(false)),
                _ => Err(format!("'{}' is not a boolean", raw)),
            },
            Self::Json => serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e)),
            _ => Ok(JsonValue::String(raw.to_string())),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Date => "date",
            Self::Json => "json",
            Self::Uuid => "uuid",
            Self::Binary => "binary",
            Self::Any => "any",
        };
        write!(f, "{}", name)
    }
}

fn describe(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

fn expect_str<'a>(value: &'a JsonValue, what: &str) -> Result<&'a str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("expected {}, got {}", what, describe(value)))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    // Naive timestamps are taken as UTC
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|ts| ts.and_utc())
}

fn untyped_param(value: &JsonValue) -> QueryParam {
    match value {
        JsonValue::Null => QueryParam::Null(None),
        JsonValue::Bool(b) => QueryParam::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => QueryParam::Int(i),
            None => QueryParam::Float(n.as_f64().unwrap_or_default()),
        },
        JsonValue::String(s) => QueryParam::String(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => QueryParam::Json(value.clone()),
    }
}

/// Whether a field must be supplied and may be null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// Supplied on create/replace, never null
    Required,
    /// Filled by the engine when omitted, never null
    Generated,
    /// Nullable, may be omitted
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub presence: Presence,
    /// Catalog type of an unmapped column as `schema.name`, e.g. `pg_catalog.inet`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_type: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType, presence: Presence) -> Self {
        Self {
            name: name.into(),
            field_type,
            presence,
            sql_type: None,
        }
    }

    pub fn with_sql_type(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = Some(sql_type.into());
        self
    }

    pub fn is_nullable(&self) -> bool {
        self.presence == Presence::Optional
    }

    /// The type values of this field are cast to on the server.
    ///
    /// Only unmapped fields with a known catalog type have one. Their values
    /// are written as text and cast, and read back through `::text`.
    pub fn cast_type(&self) -> Option<&str> {
        match self.field_type {
            FieldType::Any => self.sql_type.as_deref(),
            _ => None,
        }
    }

    /// Convert a JSON value into a bound parameter for this field.
    pub fn to_param(&self, value: &JsonValue) -> Result<QueryParam, String> {
        match self.cast_type() {
            Some(sql_type) => Ok(QueryParam::Cast {
                text: text_form(value),
                sql_type: sql_type.to_string(),
            }),
            None => self.field_type.to_param(value),
        }
    }
}

/// Text handed to a server-side cast: strings as-is, other values as JSON text.
fn text_form(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// How a field map is going to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// INSERT: every required field must be present
    Create,
    /// Full UPDATE: the caller supplies the whole record
    Replace,
    /// Partial UPDATE: only supplied fields change, the primary key never does
    Patch,
}

/// One table's field set, primary key and JSON-field set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordShape {
    table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
    primary_key: String,
    fields: Vec<FieldSpec>,
    #[serde(default)]
    json_fields: BTreeSet<String>,
}

impl RecordShape {
    /// Create an empty shape for `table` keyed by `primary_key`.
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: None,
            primary_key: primary_key.into(),
            fields: Vec::new(),
            json_fields: BTreeSet::new(),
        }
    }

    /// Set the schema the table lives in.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Append a field.
    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Append several fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldSpec>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Declare which fields hold nested JSON.
    pub fn with_json_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.json_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn json_fields(&self) -> &BTreeSet<String> {
        &self.json_fields
    }

    pub fn is_json_field(&self, name: &str) -> bool {
        self.json_fields.contains(name)
    }

    /// Table reference for statement building: `schema.table` or `table`.
    pub fn table_ref(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.table),
            None => self.table.clone(),
        }
    }

    /// Check the shape is usable: it names a table, its primary key is one of
    /// its fields, and every JSON field exists.
    pub fn check(&self) -> DbResult<()> {
        if self.table.is_empty() {
            return Err(DbError::schema("Record shape has no table name", "<unnamed>"));
        }
        if self.field(&self.primary_key).is_none() {
            return Err(DbError::schema(
                format!(
                    "Primary key '{}' is not a field of the record shape",
                    self.primary_key
                ),
                self.table.clone(),
            ));
        }
        if let Some(missing) = self.json_fields.iter().find(|f| self.field(f).is_none()) {
            return Err(DbError::schema(
                format!("JSON field '{}' is not a field of the record shape", missing),
                self.table.clone(),
            ));
        }
        Ok(())
    }

    /// Validate a field map and convert it into ordered `(column, param)` pairs.
    ///
    /// JSON fields holding a map or array are encoded here: as `jsonb` for JSON
    /// columns, as JSON text for text columns. `Patch` drops the primary key.
    /// Nulls for generated fields are dropped on create/replace so the engine
    /// default applies.
    pub fn encode(
        &self,
        data: &Map<String, JsonValue>,
        mode: WriteMode,
    ) -> DbResult<Vec<(String, QueryParam)>> {
        if let Some(unknown) = data.keys().find(|k| self.field(k).is_none()) {
            return Err(DbError::field_validation(
                &self.table,
                unknown.as_str(),
                "unknown field",
            ));
        }

        let mut values = Vec::with_capacity(data.len());
        for spec in &self.fields {
            let value = match data.get(&spec.name) {
                Some(v) => v,
                None => {
                    if mode != WriteMode::Patch && spec.presence == Presence::Required {
                        return Err(DbError::field_validation(
                            &self.table,
                            &spec.name,
                            "missing required field",
                        ));
                    }
                    continue;
                }
            };

            if mode == WriteMode::Patch && spec.name == self.primary_key {
                continue;
            }

            if value.is_null() && !spec.is_nullable() {
                if spec.presence == Presence::Generated && mode != WriteMode::Patch {
                    continue;
                }
                return Err(DbError::field_validation(
                    &self.table,
                    &spec.name,
                    "must not be null",
                ));
            }

            values.push((spec.name.clone(), self.encode_value(spec, value)?));
        }
        Ok(values)
    }

    fn encode_value(&self, spec: &FieldSpec, value: &JsonValue) -> DbResult<QueryParam> {
        if self.is_json_field(&spec.name) && !value.is_null() {
            if !(value.is_object() || value.is_array()) {
                return Err(DbError::field_validation(
                    &self.table,
                    &spec.name,
                    format!("expected a JSON object or array, got {}", describe(value)),
                ));
            }
            if spec.field_type == FieldType::Text {
                return Ok(QueryParam::String(value.to_string()));
            }
            if spec.cast_type().is_none() {
                return Ok(QueryParam::Json(value.clone()));
            }
        }
        spec.to_param(value)
            .map_err(|msg| DbError::field_validation(&self.table, &spec.name, msg))
    }

    /// Convert a primary key value into a bound parameter.
    ///
    /// String keys are parsed for non-text key types, so ids taken from a URL
    /// path bind with the column's type.
    pub fn key_param(&self, id: &JsonValue) -> DbResult<QueryParam> {
        self.filter_param(&self.primary_key, id)
    }

    /// Convert a filter value for `field` into a bound parameter.
    pub fn filter_param(&self, field: &str, value: &JsonValue) -> DbResult<QueryParam> {
        let spec = self
            .field(field)
            .ok_or_else(|| DbError::field_validation(&self.table, field, "unknown field"))?;

        let parsed;
        let value = match value {
            JsonValue::String(s) if !matches!(spec.field_type, FieldType::Text | FieldType::Any) => {
                parsed = spec
                    .field_type
                    .parse_str(s)
                    .map_err(|msg| DbError::field_validation(&self.table, field, msg))?;
                &parsed
            }
            other => other,
        };

        spec.to_param(value)
            .map_err(|msg| DbError::field_validation(&self.table, field, msg))
    }

    /// Turn a decoded row into a record, parsing JSON fields stored as text.
    ///
    /// Only `Text` and `Any` fields are parsed: `json`/`jsonb` columns are
    /// already decoded by the driver, and a JSON string held in one stays a
    /// string. A field whose text does not parse is kept as the original string.
    pub fn decode(&self, mut row: Map<String, JsonValue>) -> Record {
        for field in &self.json_fields {
            let stored_as_text = self
                .field(field)
                .is_some_and(|spec| matches!(spec.field_type, FieldType::Text | FieldType::Any));
            if !stored_as_text {
                continue;
            }
            if let Some(JsonValue::String(text)) = row.get(field) {
                match serde_json::from_str::<JsonValue>(text) {
                    Ok(parsed) => {
                        row.insert(field.clone(), parsed);
                    }
                    Err(e) => {
                        debug!(
                            table = %self.table,
                            field = %field,
                            error = %e,
                            "JSON field is not valid JSON, keeping text"
                        );
                    }
                }
            }
        }
        Record(row)
    }
}

/// A table type declared ahead of time.
///
/// Implemented by [`define_table!`](crate::define_table).
pub trait Table: Serialize + DeserializeOwned {
    const TABLE_NAME: &'static str;
    const PRIMARY_KEY: &'static str;

    fn shape() -> RecordShape;
}

/// One row as a field map, after JSON-field decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, JsonValue>);

impl Record {
    pub fn new(fields: Map<String, JsonValue>) -> Self {
        Self(fields)
    }

    /// Serialize a declared table value into a field map suitable for writes.
    pub fn from_typed<T: Table>(value: &T) -> DbResult<Self> {
        match serde_json::to_value(value) {
            Ok(JsonValue::Object(map)) => Ok(Self(map)),
            Ok(_) => Err(DbError::internal(format!(
                "{} did not serialize to an object",
                T::TABLE_NAME
            ))),
            Err(e) => Err(DbError::validation(T::TABLE_NAME, e.to_string())),
        }
    }

    /// Deserialize into a declared table type.
    pub fn into_typed<T: Table>(self) -> DbResult<T> {
        serde_json::from_value(JsonValue::Object(self.0)).map_err(|e| {
            DbError::internal(format!(
                "Row does not match {} declaration: {}",
                T::TABLE_NAME,
                e
            ))
        })
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.0.get(field)
    }

    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, JsonValue> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users_shape() -> RecordShape {
        RecordShape::new("users", "user_id")
            .with_fields([
                FieldSpec::new("user_id", FieldType::Text, Presence::Required),
                FieldSpec::new("firebase_data", FieldType::Json, Presence::Required),
                FieldSpec::new("body_data", FieldType::Json, Presence::Required),
                FieldSpec::new("nickname", FieldType::Text, Presence::Optional),
                FieldSpec::new("created_at", FieldType::Timestamp, Presence::Generated),
            ])
            .with_json_fields(["firebase_data", "body_data"])
    }

    fn obj(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_check_accepts_consistent_shape() {
        assert!(users_shape().check().is_ok());
    }

    #[test]
    fn test_check_rejects_missing_primary_key_field() {
        let shape = RecordShape::new("users", "id")
            .with_field(FieldSpec::new("user_id", FieldType::Text, Presence::Required));
        assert!(matches!(shape.check(), Err(DbError::Schema { .. })));
    }

    #[test]
    fn test_check_rejects_unnamed_table() {
        let shape = RecordShape::new("", "id")
            .with_field(FieldSpec::new("id", FieldType::Integer, Presence::Generated));
        assert!(shape.check().is_err());
    }

    #[test]
    fn test_encode_create_in_field_order() {
        let data = obj(json!({
            "body_data": {},
            "user_id": "u1",
            "firebase_data": {"email": "a@b.com"},
        }));
        let values = users_shape().encode(&data, WriteMode::Create).unwrap();
        let names: Vec<&str> = values.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["user_id", "firebase_data", "body_data"]);
        assert_eq!(values[0].1, QueryParam::String("u1".to_string()));
        assert_eq!(values[1].1, QueryParam::Json(json!({"email": "a@b.com"})));
    }

    #[test]
    fn test_encode_create_requires_required_fields() {
        let data = obj(json!({"user_id": "u1", "firebase_data": {}}));
        let err = users_shape().encode(&data, WriteMode::Create).unwrap_err();
        match err {
            DbError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("body_data")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_encode_rejects_unknown_field() {
        let data = obj(json!({"user_id": "u1", "password": "x"}));
        let err = users_shape().encode(&data, WriteMode::Patch).unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_encode_rejects_wrong_type() {
        let data = obj(json!({"nickname": 42}));
        let err = users_shape().encode(&data, WriteMode::Patch).unwrap_err();
        assert!(err.to_string().contains("expected a string"));
    }

    #[test]
    fn test_encode_rejects_scalar_in_json_field() {
        let data = obj(json!({"firebase_data": "{\"email\": \"a@b.com\"}"}));
        let err = users_shape().encode(&data, WriteMode::Patch).unwrap_err();
        assert!(err.to_string().contains("JSON object or array"));
    }

    #[test]
    fn test_encode_patch_strips_primary_key() {
        let data = obj(json!({"user_id": "u2", "nickname": "neo"}));
        let values = users_shape().encode(&data, WriteMode::Patch).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].0, "nickname");
    }

    #[test]
    fn test_encode_replace_keeps_primary_key() {
        let data = obj(json!({"user_id": "u1", "firebase_data": {}, "body_data": []}));
        let values = users_shape().encode(&data, WriteMode::Replace).unwrap();
        assert_eq!(values[0].0, "user_id");
    }

    #[test]
    fn test_encode_null_handling() {
        let shape = users_shape();
        let data = obj(json!({"nickname": null}));
        let values = shape.encode(&data, WriteMode::Patch).unwrap();
        assert_eq!(values[0].1, QueryParam::Null(Some(FieldType::Text)));

        let data = obj(json!({"body_data": null}));
        assert!(shape.encode(&data, WriteMode::Patch).is_err());

        let data = obj(json!({
            "user_id": "u1", "firebase_data": {}, "body_data": {}, "created_at": null
        }));
        let values = shape.encode(&data, WriteMode::Create).unwrap();
        assert!(values.iter().all(|(n, _)| n != "created_at"));
    }

    #[test]
    fn test_json_field_in_text_column_is_serialized() {
        let shape = RecordShape::new("notes", "id")
            .with_fields([
                FieldSpec::new("id", FieldType::Integer, Presence::Generated),
                FieldSpec::new("payload", FieldType::Text, Presence::Required),
            ])
            .with_json_fields(["payload"]);
        let data = obj(json!({"payload": {"a": [1, 2]}}));
        let values = shape.encode(&data, WriteMode::Create).unwrap();
        assert_eq!(
            values[0].1,
            QueryParam::String(r#"{"a":[1,2]}"#.to_string())
        );
    }

    #[test]
    fn test_decode_parses_json_fields_only() {
        let shape = RecordShape::new("notes", "id")
            .with_fields([
                FieldSpec::new("id", FieldType::Integer, Presence::Generated),
                FieldSpec::new("payload", FieldType::Text, Presence::Required),
                FieldSpec::new("title", FieldType::Text, Presence::Required),
            ])
            .with_json_fields(["payload"]);
        let row = obj(json!({
            "id": 1,
            "payload": "{\"a\": 1}",
            "title": "{\"looks\": \"like json\"}",
        }));
        let record = shape.decode(row);
        assert_eq!(record.get("payload"), Some(&json!({"a": 1})));
        assert_eq!(
            record.get("title"),
            Some(&json!("{\"looks\": \"like json\"}"))
        );
    }

    #[test]
    fn test_decode_keeps_unparseable_json_text() {
        let shape = RecordShape::new("notes", "id")
            .with_fields([
                FieldSpec::new("id", FieldType::Integer, Presence::Generated),
                FieldSpec::new("payload", FieldType::Text, Presence::Required),
            ])
            .with_json_fields(["payload"]);
        let row = obj(json!({"id": 1, "payload": "not json"}));
        let record = shape.decode(row);
        assert_eq!(record.get("payload"), Some(&json!("not json")));
    }

    #[test]
    fn test_decode_leaves_driver_decoded_json_alone() {
        let shape = users_shape();
        let row = obj(json!({
            "user_id": "u1",
            "firebase_data": "{\"a\": 1}",
            "body_data": {"height": 180},
        }));
        let record = shape.decode(row);
        assert_eq!(record.get("firebase_data"), Some(&json!("{\"a\": 1}")));
        assert_eq!(record.get("body_data"), Some(&json!({"height": 180})));
    }

    fn gadgets_shape() -> RecordShape {
        RecordShape::new("gadgets", "id")
            .with_fields([
                FieldSpec::new("id", FieldType::Text, Presence::Required),
                FieldSpec::new("addr", FieldType::Any, Presence::Optional)
                    .with_sql_type("pg_catalog.inet"),
                FieldSpec::new("tags", FieldType::Any, Presence::Optional)
                    .with_sql_type("pg_catalog._text"),
                FieldSpec::new("extra", FieldType::Any, Presence::Optional),
            ])
    }

    #[test]
    fn test_unmapped_fields_bind_as_cast_text() {
        let shape = gadgets_shape();
        let data = obj(json!({"id": "g1", "addr": "10.0.0.2", "tags": null, "extra": 5}));
        let values = shape.encode(&data, WriteMode::Create).unwrap();
        assert_eq!(
            values[1].1,
            QueryParam::Cast {
                text: Some("10.0.0.2".to_string()),
                sql_type: "pg_catalog.inet".to_string(),
            }
        );
        assert_eq!(
            values[2].1,
            QueryParam::Cast {
                text: None,
                sql_type: "pg_catalog._text".to_string(),
            }
        );
        // No catalog type known: the value passes through as-is
        assert_eq!(values[3].1, QueryParam::Int(5));

        let param = shape.filter_param("addr", &json!("10.0.0.1")).unwrap();
        assert_eq!(param.cast_type(), Some("pg_catalog.inet"));
        assert_eq!(
            shape.filter_param("tags", &json!(["a", "b"])).unwrap(),
            QueryParam::Cast {
                text: Some(r#"["a","b"]"#.to_string()),
                sql_type: "pg_catalog._text".to_string(),
            }
        );
    }

    #[test]
    fn test_cast_type_only_for_unmapped_fields() {
        let spec = FieldSpec::new("n", FieldType::Integer, Presence::Required)
            .with_sql_type("pg_catalog.int4");
        assert_eq!(spec.cast_type(), None);
        assert_eq!(spec.to_param(&json!(3)).unwrap(), QueryParam::Int(3));
    }

    #[test]
    fn test_key_param_parses_string_ids() {
        let shape = RecordShape::new("event_log", "event_id").with_field(FieldSpec::new(
            "event_id",
            FieldType::Integer,
            Presence::Generated,
        ));
        assert_eq!(shape.key_param(&json!("42")).unwrap(), QueryParam::Int(42));
        assert_eq!(shape.key_param(&json!(7)).unwrap(), QueryParam::Int(7));
        assert!(shape.key_param(&json!("abc")).is_err());
    }

    #[test]
    fn test_field_type_to_param() {
        assert_eq!(
            FieldType::Timestamp
                .to_param(&json!("2024-04-10T12:00:00Z"))
                .unwrap()
                .type_name(),
            "timestamp"
        );
        assert!(FieldType::Timestamp.to_param(&json!("yesterday")).is_err());
        assert_eq!(
            FieldType::Date.to_param(&json!("2024-04-10")).unwrap().type_name(),
            "date"
        );
        assert!(FieldType::Integer.to_param(&json!(1.5)).is_err());
        assert_eq!(
            FieldType::Float.to_param(&json!(2)).unwrap(),
            QueryParam::Float(2.0)
        );
        assert_eq!(
            FieldType::Binary.to_param(&json!("aGk=")).unwrap(),
            QueryParam::Bytes(b"hi".to_vec())
        );
        assert_eq!(
            FieldType::Any.to_param(&json!({"k": 1})).unwrap(),
            QueryParam::Json(json!({"k": 1}))
        );
    }

    #[test]
    fn test_parse_str() {
        assert_eq!(FieldType::Integer.parse_str("12").unwrap(), json!(12));
        assert_eq!(FieldType::Boolean.parse_str("TRUE").unwrap(), json!(true));
        assert_eq!(FieldType::Text.parse_str("12").unwrap(), json!("12"));
        assert!(FieldType::Float.parse_str("x").is_err());
    }

    #[test]
    fn test_table_ref() {
        assert_eq!(users_shape().table_ref(), "users");
        assert_eq!(users_shape().with_schema("app").table_ref(), "app.users");
    }
}
