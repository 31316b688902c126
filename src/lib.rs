pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;

use std::sync::Arc;

use config::Config;
use error::Result;
use sqlx::PgPool;

/// Shared state for one batch invocation.
pub struct PipelineState {
    /// PostgreSQL connection pool
    pub db: PgPool,

    /// Batch configuration (env defaults + CLI overrides)
    pub config: Arc<Config>,
}

impl PipelineState {
    pub async fn new(config: Config) -> Result<Self> {
        tracing::info!("Connecting to PostgreSQL...");
        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;

        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .map_err(sqlx::Error::from)?;

        Ok(Self {
            db,
            config: Arc::new(config),
        })
    }
}
