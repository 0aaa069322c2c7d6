//! Database access layer.
//!
//! This module provides PostgreSQL access:
//! - Connection pool creation
//! - Schema introspection and record-shape registry
//! - Parameterized statement building and per-table query execution
//! - Type mappings between catalog types, record fields and JSON
//! - Migration ledger and declaration codegen

pub mod builder;
pub mod codegen;
pub mod executor;
#[macro_use]
pub mod macros;
pub mod migrations;
pub mod params;
pub mod pool;
pub mod registry;
pub mod schema;
pub mod types;

pub use builder::{Condition, Direction, Projection, Statement, StatementBuilder};
pub use executor::{ListResult, QueryExecutor};
pub use migrations::{MigrationManager, MigrationRecord, MigrationReport, MigrationStatus};
pub use registry::ShapeRegistry;
pub use schema::SchemaInspector;
