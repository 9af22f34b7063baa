use sqlx::postgres::{PgPool, PgPoolOptions};

/// Construct the shared connection pool and run pending migrations.
/// Both `main.rs` (API) and `bin/worker.rs` call this at startup.
pub async fn connect_and_migrate(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
