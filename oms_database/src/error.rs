/// Store-layer error type. Every contract in spec.md §4.1 returns
/// `Result<T, DbError>`; `oms_core` wraps this into its own
/// `ExecutorError`/`DispatchError` at the call boundary.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database query failed: {0}")]
    Query(#[from] tokio_postgres::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] bb8::RunError<tokio_postgres::Error>),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("unable to connect to database: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("row missing expected column `{0}`")]
    MissingColumn(&'static str),
    #[error("stored value for `{field}` could not be decoded: {reason}")]
    Decode { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, DbError>;
