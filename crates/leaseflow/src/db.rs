use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

pub async fn make_pool(database_url: &str) -> anyhow::Result<PgPool> {
    // Every in-flight job holds a connection for each of its writes.
    let max_connections = env_number::<u32>("LEASEFLOW_DB_MAX_CONNECTIONS")
        .unwrap_or(8)
        .clamp(1, 64);

    let acquire_timeout_secs = env_number::<u64>("LEASEFLOW_DB_ACQUIRE_TIMEOUT_SECS")
        .unwrap_or(10)
        .clamp(1, 60);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
        .connect(database_url)
        .await?;

    tracing::debug!(max_connections, "connected to postgres");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
