use std::time::Duration;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

/// Connects to Postgres, retrying a fixed number of times with a fixed pause.
pub async fn connect_with_retry(
    url: &str,
    retries: u32,
    interval: Duration,
) -> anyhow::Result<PgPool> {
    let attempts = retries.max(1);
    let mut attempt = 1;
    loop {
        match PgPoolOptions::new().max_connections(10).connect(url).await {
            Ok(pool) => {
                info!(attempt, "connected to database");
                return Ok(pool);
            }
            Err(e) if attempt < attempts => {
                warn!(error = %e, attempt, attempts, "database connection failed; retrying");
                tokio::time::sleep(interval).await;
                attempt += 1;
            }
            Err(e) => return Err(e).context("connect to database"),
        }
    }
}

pub async fn run_migrations(pool: &PgPool) {
    if let Err(e) = sqlx::migrate!("./migrations").run(pool).await {
        warn!(error = %e, "migration failed; continuing");
    }
}
