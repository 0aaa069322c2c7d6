//! Shared setup for database integration tests.
//!
//! Tests run only when `TEST_DATABASE_URL` points at a PostgreSQL database
//! the test user may create schemas in. Each test gets its own schema, set as
//! the connection `search_path`, so tests can run in parallel.

#![allow(dead_code)]

use rand::Rng;
use rand::distributions::Alphanumeric;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::path::PathBuf;
use std::str::FromStr;

pub struct TestDb {
    pub pool: PgPool,
    pub schema: String,
    admin: PgPool,
}

impl TestDb {
    pub async fn drop(self) {
        self.pool.close().await;
        let sql = format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", self.schema);
        let _ = sqlx::query(&sql).execute(&self.admin).await;
        self.admin.close().await;
    }
}

/// Connect to a fresh schema, or `None` (after printing why) when no test
/// database is configured.
pub async fn setup() -> Option<TestDb> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return None;
        }
    };

    let schema = format!("crud_test_{}", random_suffix());
    let admin = PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .unwrap();
    sqlx::query(&format!("CREATE SCHEMA \"{}\"", schema))
        .execute(&admin)
        .await
        .unwrap();

    let options = PgConnectOptions::from_str(&url)
        .unwrap()
        .options([("search_path", schema.as_str())]);
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .unwrap();

    Some(TestDb { pool, schema, admin })
}

pub fn bundled_migrations() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}
