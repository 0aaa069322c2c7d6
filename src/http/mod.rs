//! HTTP surface over the table executors.
//!
//! One [`QueryExecutor`] is built per registered table at startup; the router
//! dispatches `/{table}` and `/{table}/{id}` to it. Handlers only translate
//! between HTTP and executor calls.

mod handlers;
mod response;

pub use response::{ErrorBody, ErrorDetail};

use crate::db::{QueryExecutor, ShapeRegistry};
use crate::error::{DbError, DbResult};
use axum::Router;
use axum::routing::get;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Shared router state: the pool and one executor per table.
#[derive(Debug, Clone)]
pub struct AppState {
    pool: PgPool,
    executors: Arc<BTreeMap<String, QueryExecutor>>,
}

impl AppState {
    /// Build executors for every table in `registry`.
    pub fn new(pool: PgPool, registry: &ShapeRegistry, query_timeout: Duration) -> DbResult<Self> {
        let mut executors = BTreeMap::new();
        for table in registry.table_names() {
            let executor =
                QueryExecutor::for_table(pool.clone(), registry, table)?.with_timeout(query_timeout);
            executors.insert(table.to_string(), executor);
        }
        Ok(Self {
            pool,
            executors: Arc::new(executors),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn executor(&self, table: &str) -> DbResult<&QueryExecutor> {
        self.executors
            .get(table)
            .ok_or_else(|| DbError::unknown_table(table))
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.executors.keys().map(String::as_str)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/{table}",
            get(handlers::list_records).post(handlers::create_record),
        )
        .route(
            "/{table}/{id}",
            get(handlers::get_record)
                .put(handlers::replace_record)
                .patch(handlers::patch_record)
                .delete(handlers::delete_record),
        )
        .with_state(state)
}

/// Serve until SIGINT/SIGTERM, then drain in-flight requests and close the pool.
pub async fn serve(state: AppState, bind_addr: &str) -> DbResult<()> {
    const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

    let pool = state.pool.clone();
    let tables: Vec<String> = state.tables().map(str::to_string).collect();
    let app = router(state);

    let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
        DbError::connection(
            format!("Failed to bind to {}: {}", bind_addr, e),
            "Check that the port is available",
        )
    })?;
    info!(addr = %bind_addr, tables = ?tables, "HTTP server listening");

    let shutdown_notify = Arc::new(tokio::sync::Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();
    let shutdown_signal = async move {
        wait_for_signal().await;
        shutdown_notify_clone.notify_one();
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

    tokio::select! {
        result = server => {
            match result {
                Ok(()) => info!("HTTP server stopped"),
                Err(e) => {
                    error!(error = %e, "HTTP server error");
                    return Err(DbError::internal(format!("HTTP server error: {}", e)));
                }
            }
        }
        _ = async {
            shutdown_notify.notified().await;
            info!(
                timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                "Waiting for requests to finish (send signal again to force exit)..."
            );
            tokio::select! {
                _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                    warn!("Graceful shutdown timeout, forcing exit");
                }
                _ = wait_for_signal() => {
                    warn!("Received second signal, forcing immediate exit");
                }
            }
        } => {}
    }

    info!("Closing database connections");
    pool.close().await;
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
