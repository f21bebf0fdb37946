//! Database connection and pool management
//!
//! Every mutating request holds row locks for the length of one short
//! transaction, so sessions carry a `lock_timeout` and the pool keeps a warm
//! connection for the next request.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

const APPLICATION_NAME: &str = "microlend-server";

/// Database connection error
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to database: {0}")]
    ConnectionError(String),

    #[error("Failed to run migrations: {0}")]
    MigrationError(String),

    #[error("Database health check failed: {0}")]
    HealthCheckError(String),
}

/// Pool and session settings derived from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub lock_timeout: Duration,
}

impl PoolSettings {
    pub fn from_config(config: &Config) -> Self {
        let max_connections = config.db_max_connections.max(1);
        Self {
            max_connections,
            min_connections: max_connections.min(1),
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            lock_timeout: Duration::from_millis(config.db_lock_timeout_ms),
        }
    }

    /// `lock_timeout` as Postgres expects it; `0ms` waits forever
    pub fn lock_timeout_setting(&self) -> String {
        format!("{}ms", self.lock_timeout.as_millis())
    }

    pub fn options(&self) -> PgPoolOptions {
        let lock_timeout = self.lock_timeout_setting();

        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .after_connect(move |conn, _meta| {
                let lock_timeout = lock_timeout.clone();
                Box::pin(async move {
                    sqlx::query(
                        "SELECT set_config('lock_timeout', $1, false), \
                         set_config('application_name', $2, false)",
                    )
                    .bind(lock_timeout)
                    .bind(APPLICATION_NAME)
                    .execute(&mut *conn)
                    .await?;
                    Ok(())
                })
            })
    }
}

/// Create a database connection pool
pub async fn create_pool(config: &Config) -> Result<PgPool, DbError> {
    let settings = PoolSettings::from_config(config);
    tracing::info!(
        url = %config.database_url_masked(),
        max_connections = settings.max_connections,
        lock_timeout = %settings.lock_timeout_setting(),
        "Connecting to database"
    );

    let pool = settings
        .options()
        .connect(&config.database_url)
        .await
        .map_err(|e| DbError::ConnectionError(e.to_string()))?;

    tracing::info!("Database connection pool created");

    Ok(pool)
}

/// Run the schema migrations shipped with the binary
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DbError::MigrationError(e.to_string()))?;

    tracing::info!("Database migrations applied");

    Ok(())
}

/// Check database connectivity (for health checks)
pub async fn check_health(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| DbError::HealthCheckError(e.to_string()))?;

    Ok(())
}
