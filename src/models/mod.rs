//! Data models for the CRUD core.
//!
//! This module re-exports all model types used throughout the application.

pub mod query;
pub mod record;
pub mod schema;

// Re-export commonly used types
pub use query::{
    DEFAULT_PAGE_SIZE, DEFAULT_QUERY_TIMEOUT_SECS, FilterValue, Filters, MAX_PAGE_SIZE, Page,
    QueryParam,
};
pub use record::{FieldSpec, FieldType, Presence, Record, RecordShape, Table, WriteMode};
pub use schema::{ColumnInfo, TableInfo};
