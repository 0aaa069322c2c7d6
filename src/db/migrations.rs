//! Migration ledger.
//!
//! Applies the `*.sql` files of one directory in lexical filename order and
//! records each applied file in a ledger table. A file is applied at most
//! once: its statements and its ledger row commit in the same transaction,
//! so a failure leaves neither behind.

use crate::config::DEFAULT_LEDGER_TABLE;
use crate::db::builder::quote_table;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A migration file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub name: String,
    pub path: PathBuf,
}

/// One ledger row.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRecord {
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Outcome of [`MigrationManager::apply_pending`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    /// Files applied by this run, in apply order.
    pub applied: Vec<String>,
    /// Files that were already in the ledger.
    pub already_applied: usize,
}

/// Applied and pending migrations, as reported by `status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationStatus {
    /// False until the first `apply_pending` creates the ledger table.
    pub ledger_exists: bool,
    pub applied: Vec<MigrationRecord>,
    pub pending: Vec<String>,
}

pub struct MigrationManager {
    pool: PgPool,
    dir: PathBuf,
    ledger_table: String,
}

impl MigrationManager {
    pub fn new(pool: PgPool, dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            dir: dir.into(),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }

    pub fn with_ledger_table(mut self, ledger_table: impl Into<String>) -> Self {
        self.ledger_table = ledger_table.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Apply every file not yet in the ledger.
    ///
    /// With `clear`, the ledger is dropped first so every file is re-run.
    /// Stops at the first failing file; files applied before it stay applied.
    pub async fn apply_pending(&self, clear: bool) -> DbResult<MigrationReport> {
        if clear {
            self.clear_ledger().await?;
        }
        self.ensure_ledger().await?;

        let applied = self.applied_names().await?;
        let files = discover(&self.dir)?;
        let (done, pending): (Vec<_>, Vec<_>) =
            files.into_iter().partition(|f| applied.contains(&f.name));

        let mut report = MigrationReport {
            applied: Vec::with_capacity(pending.len()),
            already_applied: done.len(),
        };

        if pending.is_empty() {
            info!(applied = done.len(), "No pending migrations");
            return Ok(report);
        }

        for file in pending {
            self.apply_file(&file).await?;
            report.applied.push(file.name);
        }

        info!(
            applied = report.applied.len(),
            already_applied = report.already_applied,
            "Migrations complete"
        );
        Ok(report)
    }

    /// Drop the ledger table. Data tables are left alone.
    pub async fn clear_ledger(&self) -> DbResult<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_table(&self.ledger_table));
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| self.ledger_error(e))?;
        warn!(ledger = %self.ledger_table, "Cleared migration ledger");
        Ok(())
    }

    /// Ledger rows ordered by application. Empty when there is no ledger yet.
    pub async fn applied(&self) -> DbResult<Vec<MigrationRecord>> {
        if !self.ledger_exists().await? {
            return Ok(Vec::new());
        }
        self.read_ledger().await
    }

    async fn read_ledger(&self) -> DbResult<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT name, applied_at FROM {} ORDER BY id",
            quote_table(&self.ledger_table)
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.ledger_error(e))?;

        rows.iter()
            .map(|row| {
                Ok(MigrationRecord {
                    name: row.try_get("name")?,
                    applied_at: row.try_get("applied_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| self.ledger_error(e))
    }

    /// Report applied and pending files. Never creates the ledger.
    pub async fn status(&self) -> DbResult<MigrationStatus> {
        let ledger_exists = self.ledger_exists().await?;
        let applied = if ledger_exists {
            self.read_ledger().await?
        } else {
            Vec::new()
        };
        let names: BTreeSet<&str> = applied.iter().map(|r| r.name.as_str()).collect();
        let pending = discover(&self.dir)?
            .into_iter()
            .filter(|f| !names.contains(f.name.as_str()))
            .map(|f| f.name)
            .collect();
        Ok(MigrationStatus {
            ledger_exists,
            applied,
            pending,
        })
    }

    /// Whether the ledger table exists, resolved the same way the DDL resolves it.
    pub async fn ledger_exists(&self) -> DbResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(quote_table(&self.ledger_table))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.ledger_error(e))
    }

    async fn ensure_ledger(&self) -> DbResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id SERIAL PRIMARY KEY, \
             name TEXT NOT NULL UNIQUE, \
             applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
            quote_table(&self.ledger_table)
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| self.ledger_error(e))?;
        debug!(ledger = %self.ledger_table, "Migration ledger ready");
        Ok(())
    }

    async fn applied_names(&self) -> DbResult<BTreeSet<String>> {
        let sql = format!("SELECT name FROM {}", quote_table(&self.ledger_table));
        let names: Vec<String> = sqlx::query_scalar(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.ledger_error(e))?;
        Ok(names.into_iter().collect())
    }

    async fn apply_file(&self, file: &MigrationFile) -> DbResult<()> {
        let sql = tokio::fs::read_to_string(&file.path)
            .await
            .map_err(|e| DbError::migration(&file.name, format!("Failed to read file: {}", e)))?;
        let fail = |e: sqlx::Error| DbError::migration(&file.name, DbError::from(e).to_string());

        // Dropping the transaction on an early return rolls it back.
        let mut tx = self.pool.begin().await.map_err(fail)?;
        sqlx::raw_sql(&sql).execute(&mut *tx).await.map_err(fail)?;

        let record = format!(
            "INSERT INTO {} (name) VALUES ($1)",
            quote_table(&self.ledger_table)
        );
        sqlx::query(&record)
            .bind(&file.name)
            .execute(&mut *tx)
            .await
            .map_err(fail)?;
        tx.commit().await.map_err(fail)?;

        info!(file = %file.name, "Applied migration");
        Ok(())
    }

    fn ledger_error(&self, err: sqlx::Error) -> DbError {
        DbError::schema(
            format!("Migration ledger query failed: {}", DbError::from(err)),
            self.ledger_table.clone(),
        )
    }
}

/// List the `*.sql` files directly inside `dir`, sorted by file name.
pub fn discover(dir: &Path) -> DbResult<Vec<MigrationFile>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        DbError::migration(
            dir.display().to_string(),
            format!("Cannot read migrations directory: {}", e),
        )
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DbError::migration(dir.display().to_string(), e.to_string()))?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => files.push(MigrationFile {
                name: name.to_string(),
                path: path.clone(),
            }),
            None => {
                return Err(DbError::migration(
                    path.display().to_string(),
                    "Migration file name is not valid UTF-8",
                ));
            }
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));

    debug!(dir = %dir.display(), count = files.len(), "Discovered migration files");
    Ok(files)
}
