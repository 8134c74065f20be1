use bb8_postgres::PostgresConnectionManager;
use tokio_postgres::NoTls;

use crate::error::{DbError, Result};

/// Bounded connection pool (spec.md §5 "database connections come from a
/// bounded pool"); `mmb_database::postgres_db::connect` used a single raw
/// `tokio_postgres::Client` per process, promoted here to `bb8` so the
/// dispatcher's many concurrent workers don't serialize on one connection.
pub type DbPool = bb8::Pool<PostgresConnectionManager<NoTls>>;

/// A connection checked out of the pool. Callers call `.transaction()` on
/// the inner client (via `tokio_postgres::GenericClient`) to open the
/// transaction boundary the store contracts in spec.md §4.1 assume.
pub type PooledClient<'a> = bb8::PooledConnection<'a, PostgresConnectionManager<NoTls>>;

pub async fn connect_pool(database_url: &str, max_size: u32) -> Result<DbPool> {
    let manager = PostgresConnectionManager::new_from_stringlike(database_url, NoTls)
        .map_err(DbError::Query)?;
    bb8::Pool::builder()
        .max_size(max_size)
        .build(manager)
        .await
        .map_err(|err| DbError::Query(err))
}
