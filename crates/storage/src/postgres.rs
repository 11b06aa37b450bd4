use sqlx::{postgres::PgPoolOptions, PgPool};
use tasklane_common::{EngineError, Result};
use tracing::info;

/// Shared Postgres handle. Repositories clone the pool, which is internally
/// reference-counted.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }
}

pub(crate) fn db_err(e: sqlx::Error) -> EngineError {
    EngineError::Database(e.to_string())
}
