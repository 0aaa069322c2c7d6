//! Schema CRUD Library
//!
//! Schema-driven CRUD over PostgreSQL: catalog introspection, typed record
//! shapes, parameterized statement building, per-table executors, a
//! migration ledger and a thin HTTP surface.

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod tables;

pub use config::Config;
pub use db::{MigrationManager, QueryExecutor, ShapeRegistry};
pub use error::{DbError, DbResult};
pub use models::{Record, RecordShape, Table};
