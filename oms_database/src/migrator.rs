use sqlx::postgres::PgPoolOptions;

use crate::error::{DbError, Result};

/// Applies every migration under `migrations/` (spec.md §3 schema), the way
/// `mmb_database::postgres_db::migrator` drives `sqlx::migrate::Migrator`
/// against a throwaway pool distinct from the runtime `bb8` pool used for
/// business queries.
pub async fn apply_migrations(database_url: &str) -> Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
        .map_err(DbError::Connect)?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(())
}
