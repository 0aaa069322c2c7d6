//! PostgreSQL type mappings.
//!
//! This module maps catalog type names to record field types and decodes
//! result rows into JSON field maps.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `map_sql_type` classifies catalog type names into [`FieldType`]s for record shapes
//! 2. `TypeCategory` classifies runtime column types so each value is decoded
//!    with the Rust type the driver accepts for it
//!
//! Row decoding never fails: a value that cannot be decoded becomes `null`
//! and is logged.

use crate::models::FieldType;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::{Map, Value as JsonValue};
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgRow, PgTypeInfo, PgTypeKind, PgValueFormat, PgValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo};
use uuid::Uuid;

// =============================================================================
// Catalog Type Mapping
// =============================================================================

/// Map a catalog type name to a field type.
///
/// Matching is case-insensitive and accepts both `information_schema` names
/// (`character varying`, `timestamp with time zone`) and internal names
/// (`varchar`, `timestamptz`, `int4`). The second element is true when the
/// type is unknown: such fields map to [`FieldType::Any`] and are always
/// treated as optional.
pub fn map_sql_type(type_name: &str) -> (FieldType, bool) {
    let lower = type_name.trim().to_lowercase();

    let field_type = match lower.as_str() {
        "integer" | "bigint" | "smallint" | "int" | "int2" | "int4" | "int8" | "serial"
        | "bigserial" | "smallserial" => FieldType::Integer,
        "numeric" | "decimal" | "real" | "double precision" | "float4" | "float8" => {
            FieldType::Float
        }
        "character varying" | "varchar" | "character" | "char" | "bpchar" | "text" => {
            FieldType::Text
        }
        "boolean" | "bool" => FieldType::Boolean,
        "timestamp"
        | "timestamp with time zone"
        | "timestamp without time zone"
        | "timestamptz" => FieldType::Timestamp,
        "date" => FieldType::Date,
        "json" | "jsonb" => FieldType::Json,
        "uuid" => FieldType::Uuid,
        "bytea" => FieldType::Binary,
        _ => return (FieldType::Any, true),
    };
    (field_type, false)
}

// =============================================================================
// Runtime Type Classification
// =============================================================================

/// Logical category for a result column's runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    TimestampTz,
    Timestamp,
    Date,
    Time,
    Unknown,
}

/// Classify a runtime type name (`INT4`, `TIMESTAMPTZ`, ...) into a category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    match type_name.to_uppercase().as_str() {
        "INT2" => TypeCategory::SmallInt,
        "INT4" => TypeCategory::Integer,
        "INT8" => TypeCategory::BigInt,
        "FLOAT4" => TypeCategory::Real,
        "FLOAT8" => TypeCategory::Double,
        "NUMERIC" => TypeCategory::Decimal,
        "BOOL" => TypeCategory::Boolean,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => TypeCategory::Text,
        "BYTEA" => TypeCategory::Binary,
        "JSON" | "JSONB" => TypeCategory::Json,
        "UUID" => TypeCategory::Uuid,
        "TIMESTAMPTZ" => TypeCategory::TimestampTz,
        "TIMESTAMP" => TypeCategory::Timestamp,
        "DATE" => TypeCategory::Date,
        "TIME" => TypeCategory::Time,
        _ => TypeCategory::Unknown,
    }
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// NUMERIC value in its exact textual form.
///
/// Decodes both the text and the binary wire formats without going through a
/// floating point value.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("NUMERIC")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        ty.name().eq_ignore_ascii_case("numeric")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => numeric_to_string(value.as_bytes()?).map(RawDecimal),
        }
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render a binary NUMERIC (base-10000 digit groups) as decimal text.
fn numeric_to_string(bytes: &[u8]) -> Result<String, BoxDynError> {
    if bytes.len() < 8 {
        return Err("numeric value too short".into());
    }
    let read_i16 = |i: usize| i16::from_be_bytes([bytes[i], bytes[i + 1]]);
    let read_u16 = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);

    let ndigits = usize::try_from(read_i16(0)).map_err(|_| "negative numeric digit count")?;
    let weight = i32::from(read_i16(2));
    let sign = read_u16(4);
    let dscale = usize::from(read_u16(6));

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }
    if bytes.len() < 8 + ndigits * 2 {
        return Err("numeric value truncated".into());
    }
    let digits: Vec<i16> = (0..ndigits).map(|i| read_i16(8 + i * 2)).collect();
    let digit_at = |idx: i32| -> i16 {
        usize::try_from(idx)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for group in 0..=weight {
            if group == 0 {
                out.push_str(&digit_at(group).to_string());
            } else {
                out.push_str(&format!("{:04}", digit_at(group)));
            }
        }
    }
    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut group = weight + 1;
        while frac.len() < dscale {
            frac.push_str(&format!("{:04}", digit_at(group)));
            group += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Ok(out)
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Binary values travel as base64 text.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Conversion of result rows into JSON field maps.
pub trait RowToJson {
    fn to_json_map(&self) -> Map<String, JsonValue>;
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_info = col.type_info();
                let category = categorize_type(type_info.name());
                let value = decode::decode_column(self, idx, type_info, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

// =============================================================================
// Column Decoders
// =============================================================================

mod decode {
    use super::*;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_info: &PgTypeInfo,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::SmallInt => get::<i16>(row, idx).map(JsonValue::from),
            TypeCategory::Integer => get::<i32>(row, idx).map(JsonValue::from),
            TypeCategory::BigInt => get::<i64>(row, idx).map(JsonValue::from),
            TypeCategory::Real => get::<f32>(row, idx).map(|v| float_value(f64::from(v))),
            TypeCategory::Double => get::<f64>(row, idx).map(float_value),
            TypeCategory::Decimal => get::<RawDecimal>(row, idx).map(decimal_value),
            TypeCategory::Boolean => get::<bool>(row, idx).map(JsonValue::Bool),
            TypeCategory::Text => get::<String>(row, idx).map(JsonValue::String),
            TypeCategory::Binary => get::<Vec<u8>>(row, idx).map(|v| encode_binary_value(&v)),
            TypeCategory::Json => get::<JsonValue>(row, idx),
            TypeCategory::Uuid => get::<Uuid>(row, idx).map(|v| JsonValue::String(v.to_string())),
            TypeCategory::TimestampTz => get::<DateTime<Utc>>(row, idx)
                .map(|v| JsonValue::String(v.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
            TypeCategory::Timestamp => get::<NaiveDateTime>(row, idx)
                .map(|v| JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
            TypeCategory::Date => get::<NaiveDate>(row, idx)
                .map(|v| JsonValue::String(v.format("%Y-%m-%d").to_string())),
            TypeCategory::Time => {
                get::<NaiveTime>(row, idx).map(|v| JsonValue::String(v.to_string()))
            }
            TypeCategory::Unknown => decode_unknown(row, idx, type_info),
        }
        .unwrap_or(JsonValue::Null)
    }

    fn get<'r, T>(row: &'r PgRow, idx: usize) -> Option<T>
    where
        T: Decode<'r, sqlx::Postgres> + Type<sqlx::Postgres>,
    {
        match row.try_get::<Option<T>, _>(idx) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(column = idx, error = %e, "Failed to decode column");
                None
            }
        }
    }

    fn float_value(v: f64) -> JsonValue {
        serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()))
    }

    fn decimal_value(v: RawDecimal) -> JsonValue {
        match v.0.parse::<f64>() {
            Ok(f) if f.is_finite() => float_value(f),
            _ => JsonValue::String(v.0),
        }
    }

    /// Text-like values of unmapped types are returned as strings when the
    /// driver can decode them; everything else becomes null. Executors read
    /// unmapped catalog columns through `::text`, so only ad hoc rows get here.
    fn decode_unknown(row: &PgRow, idx: usize, type_info: &PgTypeInfo) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(JsonValue::String);
        }
        // Enum labels travel as text in both wire formats
        if matches!(type_info.kind(), PgTypeKind::Enum(_)) {
            if let Ok(v) = row.try_get_unchecked::<Option<String>, _>(idx) {
                return v.map(JsonValue::String);
            }
        }
        tracing::warn!(
            column = idx,
            type_name = type_info.name(),
            "Unsupported column type, returning null"
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_bytes(weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(digits.len() as i16).to_be_bytes());
        out.extend_from_slice(&weight.to_be_bytes());
        out.extend_from_slice(&sign.to_be_bytes());
        out.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            out.extend_from_slice(&d.to_be_bytes());
        }
        out
    }

    #[test]
    fn test_map_sql_type_known_types() {
        assert_eq!(map_sql_type("integer"), (FieldType::Integer, false));
        assert_eq!(map_sql_type("BIGINT"), (FieldType::Integer, false));
        assert_eq!(map_sql_type("int4"), (FieldType::Integer, false));
        assert_eq!(map_sql_type("numeric"), (FieldType::Float, false));
        assert_eq!(map_sql_type("double precision"), (FieldType::Float, false));
        assert_eq!(map_sql_type("character varying"), (FieldType::Text, false));
        assert_eq!(map_sql_type("bpchar"), (FieldType::Text, false));
        assert_eq!(map_sql_type("boolean"), (FieldType::Boolean, false));
        assert_eq!(
            map_sql_type("timestamp with time zone"),
            (FieldType::Timestamp, false)
        );
        assert_eq!(
            map_sql_type("timestamp without time zone"),
            (FieldType::Timestamp, false)
        );
        assert_eq!(map_sql_type("date"), (FieldType::Date, false));
        assert_eq!(map_sql_type("JSONB"), (FieldType::Json, false));
        assert_eq!(map_sql_type("uuid"), (FieldType::Uuid, false));
        assert_eq!(map_sql_type("bytea"), (FieldType::Binary, false));
    }

    #[test]
    fn test_map_sql_type_unknown_is_forced_optional() {
        assert_eq!(map_sql_type("ARRAY"), (FieldType::Any, true));
        assert_eq!(map_sql_type("USER-DEFINED"), (FieldType::Any, true));
        assert_eq!(map_sql_type("interval"), (FieldType::Any, true));
    }

    #[test]
    fn test_categorize_type() {
        assert_eq!(categorize_type("INT4"), TypeCategory::Integer);
        assert_eq!(categorize_type("int8"), TypeCategory::BigInt);
        assert_eq!(categorize_type("NUMERIC"), TypeCategory::Decimal);
        assert_eq!(categorize_type("TIMESTAMPTZ"), TypeCategory::TimestampTz);
        assert_eq!(categorize_type("JSONB"), TypeCategory::Json);
        assert_eq!(categorize_type("INTERVAL"), TypeCategory::Unknown);
    }

    #[test]
    fn test_numeric_to_string() {
        // 12345.67
        let bytes = numeric_bytes(1, 0, 2, &[1, 2345, 6700]);
        assert_eq!(numeric_to_string(&bytes).unwrap(), "12345.67");

        // -0.0012
        let bytes = numeric_bytes(-1, NUMERIC_NEG, 4, &[12]);
        assert_eq!(numeric_to_string(&bytes).unwrap(), "-0.0012");

        // 0.00001
        let bytes = numeric_bytes(-2, 0, 5, &[1000]);
        assert_eq!(numeric_to_string(&bytes).unwrap(), "0.00001");

        // 20000 (trailing zero group omitted on the wire)
        let bytes = numeric_bytes(1, 0, 0, &[2]);
        assert_eq!(numeric_to_string(&bytes).unwrap(), "20000");

        let bytes = numeric_bytes(0, 0, 0, &[]);
        assert_eq!(numeric_to_string(&bytes).unwrap(), "0");

        let bytes = numeric_bytes(0, NUMERIC_NAN, 0, &[]);
        assert_eq!(numeric_to_string(&bytes).unwrap(), "NaN");
    }

    #[test]
    fn test_numeric_to_string_rejects_short_input() {
        assert!(numeric_to_string(&[0, 1]).is_err());
        assert!(numeric_to_string(&numeric_bytes(0, 0, 0, &[1])[..9]).is_err());
    }

    #[test]
    fn test_encode_binary_value() {
        assert_eq!(
            encode_binary_value(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(encode_binary_value(&[]), JsonValue::String(String::new()));
    }
}
