//! Request handlers.

use super::AppState;
use crate::db::ListResult;
use crate::db::pool;
use crate::error::{DbError, DbResult};
use crate::models::{DEFAULT_PAGE_SIZE, FilterValue, Filters, Page, Record};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde_json::{Map, Value as JsonValue, json};
use std::collections::HashMap;

const GTE_SUFFIX: &str = "__gte";
const LTE_SUFFIX: &str = "__lte";

pub(super) async fn health(State(state): State<AppState>) -> DbResult<Json<JsonValue>> {
    pool::ping(state.pool()).await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub(super) async fn list_records(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> DbResult<Json<ListResult>> {
    let executor = state.executor(&table)?;
    let (filters, page) = parse_list_query(&params)?;
    Ok(Json(executor.list_page(&filters, page).await?))
}

pub(super) async fn get_record(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
) -> DbResult<Json<Record>> {
    let executor = state.executor(&table)?;
    executor
        .get_by_id(&JsonValue::String(id.clone()))
        .await?
        .map(Json)
        .ok_or_else(|| DbError::not_found(table, id))
}

pub(super) async fn create_record(
    State(state): State<AppState>,
    Path(table): Path<String>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> DbResult<(StatusCode, Json<Record>)> {
    let executor = state.executor(&table)?;
    let data = object_body(body)?;
    let record = executor.create(&data).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub(super) async fn replace_record(
    state: State<AppState>,
    path: Path<(String, String)>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> DbResult<Json<Record>> {
    update_record(state, path, body, true).await
}

pub(super) async fn patch_record(
    state: State<AppState>,
    path: Path<(String, String)>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> DbResult<Json<Record>> {
    update_record(state, path, body, false).await
}

async fn update_record(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    body: Result<Json<JsonValue>, JsonRejection>,
    replace: bool,
) -> DbResult<Json<Record>> {
    let executor = state.executor(&table)?;
    let data = object_body(body)?;
    executor
        .update(&JsonValue::String(id.clone()), &data, replace)
        .await?
        .map(Json)
        .ok_or_else(|| DbError::not_found(table, id))
}

pub(super) async fn delete_record(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
) -> DbResult<StatusCode> {
    let executor = state.executor(&table)?;
    if executor.delete(&JsonValue::String(id.clone())).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(DbError::not_found(table, id))
    }
}

fn object_body(body: Result<Json<JsonValue>, JsonRejection>) -> DbResult<Map<String, JsonValue>> {
    match body {
        Ok(Json(JsonValue::Object(map))) => Ok(map),
        Ok(Json(other)) => Err(DbError::invalid_input(format!(
            "Request body must be a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(rejection) => Err(DbError::invalid_input(rejection.body_text())),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Split list query parameters into filters and a page.
///
/// `page` and `size` select the page; `<field>__gte` / `<field>__lte` add range
/// bounds; any other key is an equality filter on that field. Values stay
/// strings here and are parsed by the field's type when bound.
pub(crate) fn parse_list_query(params: &HashMap<String, String>) -> DbResult<(Filters, Page)> {
    let mut page_number = 1;
    let mut page_size = DEFAULT_PAGE_SIZE;
    let mut ranges: HashMap<&str, (Option<JsonValue>, Option<JsonValue>)> = HashMap::new();
    let mut filters = Filters::new();

    for (key, value) in params {
        match key.as_str() {
            "page" => page_number = parse_number("page", value)?,
            "size" => page_size = parse_number("size", value)?,
            _ => {
                if let Some(field) = key.strip_suffix(GTE_SUFFIX) {
                    ranges.entry(field).or_default().0 = Some(JsonValue::String(value.clone()));
                } else if let Some(field) = key.strip_suffix(LTE_SUFFIX) {
                    ranges.entry(field).or_default().1 = Some(JsonValue::String(value.clone()));
                } else {
                    filters.insert(key.clone(), FilterValue::Eq(JsonValue::String(value.clone())));
                }
            }
        }
    }

    for (field, (gte, lte)) in ranges {
        if filters.get(field).is_some() {
            return Err(DbError::invalid_input(format!(
                "Field '{}' has both an equality and a range filter",
                field
            )));
        }
        filters.insert(field, FilterValue::Range { gte, lte });
    }

    Ok((filters, Page::new(page_number, page_size)?))
}

fn parse_number(name: &str, value: &str) -> DbResult<u32> {
    value.trim().parse::<u32>().map_err(|_| {
        DbError::invalid_input(format!("'{}' must be a positive integer, got '{}'", name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_list_query_defaults() {
        let (filters, page) = parse_list_query(&HashMap::new()).unwrap();
        assert!(filters.is_empty());
        assert_eq!(page.number(), 1);
        assert_eq!(page.size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_parse_list_query_filters_and_ranges() {
        let (filters, page) = parse_list_query(&params(&[
            ("page", "2"),
            ("size", "25"),
            ("user_id", "u1"),
            ("ts__gte", "2024-01-01T00:00:00Z"),
            ("ts__lte", "2024-02-01T00:00:00Z"),
            ("event_id__gte", "10"),
        ]))
        .unwrap();

        assert_eq!(page.number(), 2);
        assert_eq!(page.size(), 25);
        assert_eq!(filters.len(), 3);
        assert_eq!(filters.get("user_id"), Some(&FilterValue::Eq(json!("u1"))));
        assert_eq!(
            filters.get("ts"),
            Some(&FilterValue::Range {
                gte: Some(json!("2024-01-01T00:00:00Z")),
                lte: Some(json!("2024-02-01T00:00:00Z")),
            })
        );
        assert_eq!(
            filters.get("event_id"),
            Some(&FilterValue::Range {
                gte: Some(json!("10")),
                lte: None,
            })
        );
    }

    #[test]
    fn test_parse_list_query_rejects_bad_paging() {
        for (key, value) in [("page", "0"), ("size", "0"), ("size", "101"), ("page", "abc"), ("size", "-1")] {
            let err = parse_list_query(&params(&[(key, value)])).unwrap_err();
            assert!(
                matches!(err, DbError::InvalidInput { .. }),
                "{}={} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn test_parse_list_query_rejects_mixed_filter() {
        let err = parse_list_query(&params(&[("ts", "x"), ("ts__gte", "y")])).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[test]
    fn test_object_body_rejects_non_objects() {
        assert!(object_body(Ok(Json(json!({"a": 1})))).is_ok());
        let err = object_body(Ok(Json(json!([1, 2])))).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }
}
