//! Database access: connection pool and migration management.

pub mod migrate;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::config::DatabaseConfig;
use crate::Result;

/// Thin wrapper around the connection pool, passed around the service
/// layer instead of a bare `Pool<Postgres>` so call sites read as domain
/// code rather than raw sqlx.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

/// Build a connection pool from a `DatabaseConfig`.
pub async fn create_pool(config: &DatabaseConfig) -> Result<Pool<Postgres>> {
    let database_url = format!(
        "postgres://{}:{}@{}:{}/{}",
        config.username, config.password, config.host, config.port, config.database
    );

    tracing::info!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        "connecting to postgres"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .connect(&database_url)
        .await?;

    tracing::info!("postgres connected");
    Ok(pool)
}
