//! Database connection management

use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;

/// Create a new database connection pool
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.url)
        .await
}

/// Create a pool and bring the schema up to date
pub async fn connect_and_migrate(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let pool = create_pool(config).await?;
    super::run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");
    Ok(pool)
}
