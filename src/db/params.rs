//! Parameter binding utilities for database queries.
//!
//! Binds `QueryParam` values to PostgreSQL query objects. Typed NULLs bind as
//! `None` of the column's Rust type so the server infers the right parameter
//! type (an untyped text NULL cannot be written into a `jsonb` column).

use crate::models::{FieldType, QueryParam};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::types::Json;
use uuid::Uuid;

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_param<'q>(query: PgQuery<'q>, param: &'q QueryParam) -> PgQuery<'q> {
    match param {
        QueryParam::Null(field_type) => bind_null(query, *field_type),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
        QueryParam::Timestamp(v) => query.bind(*v),
        QueryParam::Date(v) => query.bind(*v),
        QueryParam::Uuid(v) => query.bind(*v),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
        QueryParam::Cast { text, .. } => query.bind(text.as_deref()),
    }
}

/// Bind every parameter in order.
pub(crate) fn bind_all<'q>(mut query: PgQuery<'q>, params: &'q [QueryParam]) -> PgQuery<'q> {
    for param in params {
        query = bind_param(query, param);
    }
    query
}

fn bind_null(query: PgQuery<'_>, field_type: Option<FieldType>) -> PgQuery<'_> {
    match field_type {
        Some(FieldType::Integer) => query.bind(None::<i64>),
        Some(FieldType::Float) => query.bind(None::<f64>),
        Some(FieldType::Boolean) => query.bind(None::<bool>),
        Some(FieldType::Timestamp) => query.bind(None::<DateTime<Utc>>),
        Some(FieldType::Date) => query.bind(None::<NaiveDate>),
        Some(FieldType::Json) => query.bind(None::<Json<serde_json::Value>>),
        Some(FieldType::Uuid) => query.bind(None::<Uuid>),
        Some(FieldType::Binary) => query.bind(None::<Vec<u8>>),
        Some(FieldType::Text) | Some(FieldType::Any) | None => query.bind(None::<String>),
    }
}
