use sqlx::PgPool;
use tracing::{info, warn};

use adflux_core::config::PostgresConfig;

/// Create a PostgreSQL connection pool and run migrations.
/// Returns None if no usable connection is configured; callers fall back to
/// the in-memory stores.
pub async fn init_pg_pool(config: &PostgresConfig) -> Option<PgPool> {
    let url = config.database_url();
    if config.password.is_empty() && std::env::var("PG_URL").is_err() {
        warn!("PostgreSQL not configured — running on in-memory stores");
        return None;
    }

    match PgPool::connect(&url).await {
        Ok(pool) => {
            info!(host = %config.host, database = %config.database, "PostgreSQL connected");
            match sqlx::migrate!("../../migrations").run(&pool).await {
                Ok(_) => {
                    info!("database migrations applied");
                    Some(pool)
                }
                Err(e) => {
                    warn!("migrations failed: {e} — falling back to in-memory stores");
                    None
                }
            }
        }
        Err(e) => {
            warn!("PostgreSQL connection failed: {e} — falling back to in-memory stores");
            None
        }
    }
}
