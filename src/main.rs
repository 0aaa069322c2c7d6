//! Schema CRUD - Main entry point.
//!
//! Serves a CRUD API over the configured PostgreSQL schema, applies
//! migrations, reports migration status and generates table declarations.

use schema_crud::config::{Command, Config, ServeArgs, ShapeSource};
use schema_crud::db::registry::shape_from_table;
use schema_crud::db::{MigrationManager, SchemaInspector, ShapeRegistry, codegen, pool};
use schema_crud::error::DbResult;
use schema_crud::http::{self, AppState};
use schema_crud::tables::declared_shapes;
use sqlx::PgPool;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();
    init_tracing(&config);

    let db_config = config.database()?;
    db_config.pool_options.validate()?;

    let command = config.command();
    info!(
        command = command.name(),
        schema = %config.schema,
        "Starting schema-crud v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = pool::connect(&db_config).await?;

    let result = match command {
        Command::Serve(args) => serve(&config, pool.clone(), args).await,
        Command::Migrate { clear } => migrate(&config, pool.clone(), clear).await,
        Command::Status => status(&config, pool.clone()).await,
        Command::Codegen { tables } => generate(&config, &pool, &tables).await,
    };

    pool.close().await;

    if let Err(e) = result {
        error!(error = %e, kind = e.kind(), "Command failed");
        return Err(e.into());
    }

    info!("Shutdown complete");
    Ok(())
}

fn migration_manager(config: &Config, pool: PgPool) -> MigrationManager {
    MigrationManager::new(pool, &config.migrations_dir).with_ledger_table(&config.ledger_table)
}

async fn serve(config: &Config, pool: PgPool, args: ServeArgs) -> DbResult<()> {
    if args.migrate {
        migration_manager(config, pool.clone())
            .apply_pending(false)
            .await?;
    }

    let declared: Vec<_> = declared_shapes()
        .into_iter()
        .map(|shape| shape.with_schema(&config.schema))
        .collect();

    let mut registry = ShapeRegistry::new();
    match config.shapes {
        ShapeSource::Declared => {
            registry.load_declared(declared)?;
        }
        ShapeSource::Catalog => {
            registry
                .load_from_catalog(&pool, &config.schema, &declared, &[config.ledger_table.as_str()])
                .await?;
        }
    }

    let state = AppState::new(pool, &registry, config.query_timeout_duration())?;
    http::serve(state, &args.bind_addr()).await
}

async fn migrate(config: &Config, pool: PgPool, clear: bool) -> DbResult<()> {
    let report = migration_manager(config, pool).apply_pending(clear).await?;
    for name in &report.applied {
        println!("applied  {}", name);
    }
    println!(
        "{} applied, {} already applied",
        report.applied.len(),
        report.already_applied
    );
    Ok(())
}

async fn status(config: &Config, pool: PgPool) -> DbResult<()> {
    let status = migration_manager(config, pool).status().await?;
    if !status.ledger_exists {
        println!("no ledger yet ({})", config.ledger_table);
    }
    for record in &status.applied {
        println!("applied  {}  {}", record.name, record.applied_at.to_rfc3339());
    }
    for name in &status.pending {
        println!("pending  {}", name);
    }
    Ok(())
}

async fn generate(config: &Config, pool: &PgPool, only: &[String]) -> DbResult<()> {
    let declared = declared_shapes();
    let tables = SchemaInspector::introspect(pool, &config.schema).await?;
    let shapes: Vec<_> = tables
        .iter()
        .filter(|t| only.is_empty() || only.contains(&t.name))
        .filter(|t| t.name != config.ledger_table)
        .filter_map(|t| shape_from_table(t, declared.iter().find(|s| s.table() == t.name)))
        .collect();

    print!("{}", codegen::render_module(&shapes));
    Ok(())
}
