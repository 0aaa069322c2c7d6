//! Query execution engine.
//!
//! A [`QueryExecutor`] serves CRUD operations for one table described by a
//! [`RecordShape`]:
//! - Field maps are validated and encoded by the shape before any SQL is built
//! - Statements come from [`StatementBuilder`], so values are always bound
//! - Rows are decoded to JSON and JSON fields parsed back into structures
//!
//! # Transactions
//!
//! Every operation acquires a connection, opens exactly one transaction, runs
//! its statements and commits. The whole operation is bounded by the query
//! timeout. When it errors, times out or is cancelled, the transaction is
//! dropped uncommitted and rolls back.

use crate::db::builder::{Condition, Direction, Projection, Statement, StatementBuilder};
use crate::db::params::bind_all;
use crate::db::registry::ShapeRegistry;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{
    DEFAULT_QUERY_TIMEOUT_SECS, FilterValue, Filters, Page, Record, RecordShape, Table, WriteMode,
};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// A page of records as returned by [`QueryExecutor::list_page`].
#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub items: Vec<Record>,
    pub total: i64,
    pub page: u32,
    pub size: u32,
    pub pages: u64,
}

/// CRUD executor for a single table.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    pool: PgPool,
    shape: Arc<RecordShape>,
    query_timeout: Duration,
}

impl QueryExecutor {
    /// Create an executor, failing fast when the shape is unusable.
    pub fn new(pool: PgPool, shape: Arc<RecordShape>) -> DbResult<Self> {
        shape.check()?;
        Ok(Self {
            pool,
            shape,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        })
    }

    /// Create an executor for a table known to the registry.
    pub fn for_table(pool: PgPool, registry: &ShapeRegistry, table: &str) -> DbResult<Self> {
        Self::new(pool, registry.shape(table)?)
    }

    /// Bound every operation by `query_timeout` instead of the default.
    pub fn with_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn shape(&self) -> &RecordShape {
        &self.shape
    }

    pub fn table(&self) -> &str {
        self.shape.table()
    }

    // ===== Reads =====

    /// Fetch one record by primary key.
    pub async fn get_by_id(&self, id: &JsonValue) -> DbResult<Option<Record>> {
        let key = self.shape.key_param(id)?;
        let stmt = StatementBuilder::select_projected(&self.shape.table_ref(), &self.projection())
            .where_(Condition::eq(self.shape.primary_key(), key))
            .limit(1)
            .build();

        self.bounded("get_by_id", async {
            let mut tx = self.pool.begin().await?;
            let row = fetch_optional(&mut tx, &stmt).await?;
            tx.commit().await?;
            Ok(row.map(|r| self.decode(&r)))
        })
        .await
    }

    /// Fetch one page of records matching `filters`, ordered by primary key.
    pub async fn list(&self, filters: &Filters, page: Page) -> DbResult<Vec<Record>> {
        let select = StatementBuilder::select_projected(&self.shape.table_ref(), &self.projection());
        let builder = self.filtered(select, filters)?;
        let stmt = builder
            .order_by(self.shape.primary_key(), Direction::Asc)
            .limit(u64::from(page.size()))
            .offset(page.offset())
            .build();

        self.bounded("list", async {
            let mut tx = self.pool.begin().await?;
            let rows = fetch_all(&mut tx, &stmt).await?;
            tx.commit().await?;
            Ok(rows.iter().map(|r| self.decode(r)).collect::<Vec<_>>())
        })
        .await
    }

    /// Count records matching `filters`.
    pub async fn count(&self, filters: &Filters) -> DbResult<i64> {
        let stmt = self
            .filtered(StatementBuilder::count(&self.shape.table_ref()), filters)?
            .build();

        self.bounded("count", async {
            let mut tx = self.pool.begin().await?;
            let row = fetch_one(&mut tx, &stmt).await?;
            tx.commit().await?;
            Ok(row.try_get::<i64, _>(0)?)
        })
        .await
    }

    /// One page of records plus the total count and page arithmetic.
    ///
    /// The page and the count run concurrently in separate transactions, so
    /// concurrent writes can make `total` disagree with what the page shows.
    pub async fn list_page(&self, filters: &Filters, page: Page) -> DbResult<ListResult> {
        let (items, total) =
            futures_util::try_join!(self.list(filters, page), self.count(filters))?;
        Ok(ListResult {
            items,
            total,
            page: page.number(),
            size: page.size(),
            pages: page.total_pages(total),
        })
    }

    /// Fetch one record as a declared table type.
    pub async fn get_typed<T: Table>(&self, id: &JsonValue) -> DbResult<Option<T>> {
        self.get_by_id(id)
            .await?
            .map(Record::into_typed)
            .transpose()
    }

    // ===== Writes =====

    /// Insert a record and return it as stored.
    ///
    /// A duplicate key surfaces as [`DbError::Conflict`].
    pub async fn create(&self, data: &Map<String, JsonValue>) -> DbResult<Record> {
        let values = self.shape.encode(data, WriteMode::Create)?;
        if values.is_empty() {
            return Err(DbError::validation(self.table(), "no fields supplied"));
        }
        let stmt = StatementBuilder::insert(&self.shape.table_ref(), values)?
            .returning_projected(&self.projection())
            .build();

        let record = self
            .bounded("create", async {
                let mut tx = self.pool.begin().await?;
                let row = fetch_one(&mut tx, &stmt)
                    .await
                    .map_err(|e| DbError::from_write(self.table(), e))?;
                tx.commit()
                    .await
                    .map_err(|e| DbError::from_write(self.table(), e))?;
                Ok(self.decode(&row))
            })
            .await?;

        debug!(
            table = self.table(),
            id = ?record.get(self.shape.primary_key()),
            "Created record"
        );
        Ok(record)
    }

    /// Insert a declared table value and return it as stored.
    pub async fn create_typed<T: Table>(&self, value: &T) -> DbResult<T> {
        let record = Record::from_typed(value)?;
        self.create(record.as_map()).await?.into_typed()
    }

    /// Update the record with primary key `id`.
    ///
    /// With `replace`, `data` is validated as a whole record and may only repeat
    /// the key it is addressed by. Without it, only the supplied fields change and
    /// the key field is ignored; an empty change set returns the current record.
    /// Returns `None` when no record has that key.
    pub async fn update(
        &self,
        id: &JsonValue,
        data: &Map<String, JsonValue>,
        replace: bool,
    ) -> DbResult<Option<Record>> {
        if !replace && data.is_empty() {
            return self.get_by_id(id).await;
        }

        let key = self.shape.key_param(id)?;
        let mode = if replace {
            WriteMode::Replace
        } else {
            WriteMode::Patch
        };
        let mut values = self.shape.encode(data, mode)?;

        let pk = self.shape.primary_key();
        if let Some(pos) = values.iter().position(|(name, _)| name == pk) {
            let (_, supplied) = values.remove(pos);
            if supplied != key {
                return Err(DbError::field_validation(
                    self.table(),
                    pk,
                    "primary key cannot be changed",
                ));
            }
        }
        if values.is_empty() {
            return self.get_by_id(id).await;
        }

        let stmt = StatementBuilder::update(&self.shape.table_ref(), values)?
            .where_(Condition::eq(pk, key))
            .returning_projected(&self.projection())
            .build();

        let record = self
            .bounded("update", async {
                let mut tx = self.pool.begin().await?;
                let row = fetch_optional(&mut tx, &stmt)
                    .await
                    .map_err(|e| DbError::from_write(self.table(), e))?;
                tx.commit()
                    .await
                    .map_err(|e| DbError::from_write(self.table(), e))?;
                Ok(row.map(|r| self.decode(&r)))
            })
            .await?;

        debug!(
            table = self.table(),
            id = %id,
            found = record.is_some(),
            replace,
            "Updated record"
        );
        Ok(record)
    }

    /// Delete the record with primary key `id`. Returns whether exactly one row went away.
    pub async fn delete(&self, id: &JsonValue) -> DbResult<bool> {
        let key = self.shape.key_param(id)?;
        let stmt = StatementBuilder::delete(&self.shape.table_ref())
            .where_(Condition::eq(self.shape.primary_key(), key))
            .build();

        let rows_affected = self
            .bounded("delete", async {
                let mut tx = self.pool.begin().await?;
                let rows_affected = execute(&mut tx, &stmt).await?;
                tx.commit().await?;
                Ok(rows_affected)
            })
            .await?;

        debug!(table = self.table(), id = %id, rows_affected, "Deleted record");
        Ok(rows_affected == 1)
    }

    // ===== Helpers =====

    /// Apply list/count filters. Unknown fields are a validation failure.
    fn filtered(&self, mut builder: StatementBuilder, filters: &Filters) -> DbResult<StatementBuilder> {
        for (field, filter) in filters.iter() {
            match filter {
                FilterValue::Eq(value) => {
                    let param = self.shape.filter_param(field, value)?;
                    builder = builder.where_(Condition::eq(field, param));
                }
                FilterValue::Range { gte, lte } => {
                    if let Some(v) = gte {
                        let param = self.shape.filter_param(field, v)?;
                        builder = builder.where_(Condition::gte(field, param));
                    }
                    if let Some(v) = lte {
                        let param = self.shape.filter_param(field, v)?;
                        builder = builder.where_(Condition::lte(field, param));
                    }
                }
            }
        }
        Ok(builder)
    }

    /// Output columns: every field, with unmapped types read back as text.
    fn projection(&self) -> Vec<Projection<'_>> {
        self.shape
            .fields()
            .iter()
            .map(|f| match f.cast_type() {
                Some(_) => Projection::Text(&f.name),
                None => Projection::Column(&f.name),
            })
            .collect()
    }

    fn decode(&self, row: &PgRow) -> Record {
        self.shape.decode(row.to_json_map())
    }

    /// Run `work` under the query timeout.
    async fn bounded<T>(
        &self,
        operation: &str,
        work: impl Future<Output = DbResult<T>>,
    ) -> DbResult<T> {
        let start = Instant::now();
        let result = match timeout(self.query_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(operation, self.query_timeout)),
        };
        debug!(
            table = self.table(),
            operation,
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Operation finished"
        );
        result
    }
}

fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, timeout.as_secs() as u32)
}

// =============================================================================
// Statement Execution
// =============================================================================

fn log_statement(stmt: &Statement) {
    debug!(sql = %stmt.sql, params = stmt.params.len(), "Executing statement");
}

async fn fetch_optional(
    conn: &mut PgConnection,
    stmt: &Statement,
) -> Result<Option<PgRow>, sqlx::Error> {
    log_statement(stmt);
    bind_all(sqlx::query(&stmt.sql), &stmt.params)
        .fetch_optional(conn)
        .await
}

async fn fetch_one(conn: &mut PgConnection, stmt: &Statement) -> Result<PgRow, sqlx::Error> {
    log_statement(stmt);
    bind_all(sqlx::query(&stmt.sql), &stmt.params)
        .fetch_one(conn)
        .await
}

async fn fetch_all(conn: &mut PgConnection, stmt: &Statement) -> Result<Vec<PgRow>, sqlx::Error> {
    log_statement(stmt);
    bind_all(sqlx::query(&stmt.sql), &stmt.params)
        .fetch_all(conn)
        .await
}

async fn execute(conn: &mut PgConnection, stmt: &Statement) -> Result<u64, sqlx::Error> {
    log_statement(stmt);
    let result = bind_all(sqlx::query(&stmt.sql), &stmt.params)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
