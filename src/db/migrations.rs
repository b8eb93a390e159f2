use sqlx::{Pool, Postgres};
use tracing::info;

use crate::db::connection::get_connection;
use crate::queue::{is_postgres_url, StoreError};

/// Run all pending database migrations
///
/// The SQL files under `migrations/` are embedded at compile time and
/// sqlx records which ones were applied, so this is safe to run repeatedly.
pub async fn run_migrations(pool: &Pool<Postgres>) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
}

/// Migrate every distinct Postgres database the broker and result backend use
///
/// In-memory stores are skipped. Returns how many databases were migrated.
pub async fn migrate_stores(
    broker_url: &str,
    backend_url: &str,
    max_connections: u32,
) -> Result<usize, StoreError> {
    let mut urls = vec![broker_url];
    if backend_url != broker_url {
        urls.push(backend_url);
    }

    let mut migrated = 0;
    for url in urls.into_iter().filter(|url| is_postgres_url(url)) {
        info!("Running database migrations...");
        let pool = get_connection(url, max_connections).await?;
        run_migrations(&pool).await?;
        pool.close().await;
        migrated += 1;
        info!("Database migrations completed successfully");
    }

    Ok(migrated)
}
